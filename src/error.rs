use std::fmt;

/// Error taxonomy shared by every blocking operation on a channel.
///
/// Implements `Display`/`Error` so callers can propagate these with `?`
/// through a boxed `dyn Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanError {
    /// The channel's [`Shutdown`](crate::runtime::Shutdown) token was
    /// triggered before or during the call.
    Canceled,
    /// Reserved for a dynamic/type-erased entry point that resolves a
    /// handle id against a registry. The generic, statically-typed
    /// `Sender<T>`/`Receiver<T>` API can never produce this: every handle
    /// is checked by the compiler, not at runtime.
    BadHandle,
    /// A selection was built with no clauses, or (in a future type-erased
    /// entry point) a clause referenced a channel with a mismatched
    /// element type.
    InvalidArgument,
    /// The channel is done or closed.
    BrokenPipe,
    /// The deadline elapsed (or the call was non-blocking and no fast
    /// path was available) before the operation could complete.
    TimedOut,
    /// Reserved for allocation failure. Rust's global allocator aborts
    /// the process instead of returning an error from `Vec`/`Arc`
    /// construction, so this variant is unreachable from the safe API.
    OutOfMemory,
}

impl fmt::Display for ChanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Canceled => "operation canceled: runtime is shutting down",
            Self::BadHandle => "invalid channel handle",
            Self::InvalidArgument => "invalid argument",
            Self::BrokenPipe => "channel is done or closed",
            Self::TimedOut => "deadline elapsed",
            Self::OutOfMemory => "allocation failed",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ChanError {}

/// Error returned by the non-blocking [`Sender::try_send`](crate::Sender::try_send)
/// fast path, carrying the value back when it could not be delivered.
#[derive(Debug)]
pub enum TrySendError<T> {
    /// Neither a waiting receiver nor a free buffer slot was available.
    Full(T),
    /// The channel is done or closed.
    Disconnected(T),
}

impl<T> TrySendError<T> {
    /// Consumes the error, yielding back the value that failed to send.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(v) | Self::Disconnected(v) => v,
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("sending on a full channel"),
            Self::Disconnected(_) => f.write_str("sending on a done channel"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

impl<T> From<TrySendError<T>> for ChanError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => ChanError::TimedOut,
            TrySendError::Disconnected(_) => ChanError::BrokenPipe,
        }
    }
}

/// Error returned by the non-blocking [`Receiver::try_recv`](crate::Receiver::try_recv)
/// fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Neither the buffer nor a waiting sender had a value ready.
    Empty,
    /// The channel is done or closed and the buffer is drained.
    Disconnected,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("receiving on an empty channel"),
            Self::Disconnected => f.write_str("receiving on a done channel"),
        }
    }
}

impl std::error::Error for TryRecvError {}

impl From<TryRecvError> for ChanError {
    fn from(e: TryRecvError) -> Self {
        match e {
            TryRecvError::Empty => ChanError::TimedOut,
            TryRecvError::Disconnected => ChanError::BrokenPipe,
        }
    }
}

/// Error returned by [`Select::choose`](crate::Select::choose)/
/// [`choose_deadline`](crate::Select::choose_deadline).
///
/// `index` names the clause responsible for the failure (a done channel)
/// when the failure is attributable to one specific clause. It is `None`
/// for a failure of the selection as a whole: the deadline elapsed with
/// nothing ready, no clauses were given, or the runtime shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectError {
    pub index: Option<usize>,
    pub error: ChanError,
}

impl SelectError {
    pub(crate) fn clause(index: usize, error: ChanError) -> Self {
        Self {
            index: Some(index),
            error,
        }
    }

    pub(crate) fn global(error: ChanError) -> Self {
        Self { index: None, error }
    }
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "clause {i}: {}", self.error),
            None => fmt::Display::fmt(&self.error, f),
        }
    }
}

impl std::error::Error for SelectError {}

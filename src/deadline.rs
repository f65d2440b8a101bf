use std::time::Duration;
use tokio::time::Instant;

/// When a blocking call should give up: block indefinitely, probe once
/// without suspending, or suspend until a concrete instant. An explicit
/// enum rather than a signed-integer sentinel (negative ⇒ no timeout,
/// zero ⇒ non-blocking, positive ⇒ absolute deadline) since Rust has no
/// natural "negative means infinite" idiom for a `usize`-typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Block indefinitely.
    Never,
    /// Never suspend: try the fast path once and fail with
    /// [`ChanError::TimedOut`](crate::ChanError::TimedOut) otherwise.
    Immediate,
    /// Block until the given instant.
    At(Instant),
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self::At(Instant::now() + timeout)
    }
}

impl From<Duration> for Deadline {
    fn from(d: Duration) -> Self {
        Self::after(d)
    }
}

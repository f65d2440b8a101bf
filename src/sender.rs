use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll, Waker};

use crate::channel::{ChannelInner, SendAttempt, WaitNode};
use crate::deadline::Deadline;
use crate::error::{ChanError, TrySendError};

/// The sending half of a channel created by [`channel`](crate::channel).
///
/// Cloning a `Sender` increments an internal reference count; the channel
/// is marked done only once every clone (and the original) has dropped,
/// mirroring how `std::sync::mpsc`/`flume` tear down a channel on last-
/// handle drop rather than requiring an explicit `close()` call. See
/// DESIGN.md for the rationale.
pub struct Sender<T> {
    pub(crate) inner: Arc<ChannelInner<T>>,
}

impl<T> Sender<T> {
    pub(crate) fn new(inner: Arc<ChannelInner<T>>) -> Self {
        Self { inner }
    }

    /// Number of elements currently buffered.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer capacity this channel was created with (`0` for a pure
    /// rendezvous channel).
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Attempts to send without suspending. Fails with
    /// [`TrySendError::Full`] if neither a waiting receiver nor a free
    /// buffer slot is available, or [`TrySendError::Disconnected`] if the
    /// channel is done or closed.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        match self.inner.attempt_send(value, None) {
            SendAttempt::Sent => Ok(()),
            SendAttempt::Closed(v) => Err(TrySendError::Disconnected(v)),
            SendAttempt::WouldBlock(v) => Err(TrySendError::Full(v)),
            SendAttempt::Parked(_) => unreachable!("attempt_send never parks without a waker"),
        }
    }

    /// Sends `value`, suspending until a receiver is ready, buffer space
    /// frees up, or the channel becomes done.
    pub async fn send(&self, value: T) -> Result<(), ChanError> {
        self.send_deadline(value, Deadline::Never).await
    }

    /// Sends `value`, suspending at most until `deadline`.
    pub async fn send_deadline(&self, value: T, deadline: Deadline) -> Result<(), ChanError> {
        if self.inner.shutdown.is_triggered() {
            return Err(ChanError::Canceled);
        }
        match deadline {
            Deadline::Immediate => match self.try_send(value) {
                Ok(()) => Ok(()),
                Err(e) => Err(e.into()),
            },
            Deadline::Never => SendFuture::new(&self.inner, value).await,
            Deadline::At(at) => match tokio::time::timeout_at(at, SendFuture::new(&self.inner, value)).await {
                Ok(result) => result,
                Err(_) => Err(ChanError::TimedOut),
            },
        }
    }

    /// Marks the channel done: buffered elements remain available to
    /// receivers, but no further element may be enqueued and every parked
    /// sender or receiver is woken with [`ChanError::BrokenPipe`].
    ///
    /// Errs if the channel is already done.
    pub fn done(&self) -> Result<(), ChanError> {
        self.inner.done()
    }

    /// Marks the channel closed: like [`done`](Self::done) but also
    /// discards any buffered elements. Idempotent, unlike `done`.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.tx_count.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.inner.tx_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.mark_done_on_last_handle_drop();
        }
    }
}

/// Future returned by [`Sender::send`]/[`Sender::send_deadline`].
///
/// Dropping a pending `SendFuture` before it resolves (cancellation,
/// `select!`, a losing `choose` race) removes its wait node from the
/// channel's sender queue so no later receiver can hand off into a value
/// nobody will ever observe.
struct SendFuture<'a, T> {
    inner: &'a ChannelInner<T>,
    state: SendState<T>,
}

enum SendState<T> {
    Initial(Option<T>),
    Parked(Arc<WaitNode<T>>, Waker),
    Done,
}

impl<'a, T> SendFuture<'a, T> {
    fn new(inner: &'a ChannelInner<T>, value: T) -> Self {
        Self {
            inner,
            state: SendState::Initial(Some(value)),
        }
    }
}

impl<'a, T> Unpin for SendFuture<'a, T> {}

impl<'a, T> Future for SendFuture<'a, T> {
    type Output = Result<(), ChanError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                SendState::Initial(value) => {
                    let value = value.take().expect("SendFuture polled after completion");
                    match this.inner.attempt_send(value, Some(cx.waker())) {
                        SendAttempt::Sent => {
                            this.state = SendState::Done;
                            return Poll::Ready(Ok(()));
                        }
                        SendAttempt::Closed(_) => {
                            this.state = SendState::Done;
                            return Poll::Ready(Err(ChanError::BrokenPipe));
                        }
                        SendAttempt::WouldBlock(_) => unreachable!("a waker was supplied"),
                        SendAttempt::Parked(node) => {
                            let waker = cx.waker().clone();
                            this.inner.shutdown.register(&waker);
                            if this.inner.shutdown.is_triggered() {
                                this.inner.unpark_sender(&node);
                                this.inner.shutdown.unregister(&waker);
                                this.state = SendState::Done;
                                return Poll::Ready(Err(ChanError::Canceled));
                            }
                            this.state = SendState::Parked(node, waker);
                            return Poll::Pending;
                        }
                    }
                }
                SendState::Parked(node, waker) => {
                    if this.inner.shutdown.is_triggered() {
                        this.inner.unpark_sender(node);
                        this.inner.shutdown.unregister(waker);
                        this.state = SendState::Done;
                        return Poll::Ready(Err(ChanError::Canceled));
                    }
                    if !waker.will_wake(cx.waker()) {
                        this.inner.shutdown.unregister(waker);
                        *waker = cx.waker().clone();
                        this.inner.shutdown.register(waker);
                    }
                    return match node.poll(cx.waker()) {
                        Poll::Ready(Ok(_)) => {
                            this.inner.shutdown.unregister(waker);
                            this.state = SendState::Done;
                            Poll::Ready(Ok(()))
                        }
                        Poll::Ready(Err(e)) => {
                            this.inner.shutdown.unregister(waker);
                            this.state = SendState::Done;
                            Poll::Ready(Err(e))
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                SendState::Done => panic!("SendFuture polled after completion"),
            }
        }
    }
}

impl<'a, T> Drop for SendFuture<'a, T> {
    fn drop(&mut self) {
        if let SendState::Parked(node, waker) = &self.state {
            self.inner.unpark_sender(node);
            self.inner.shutdown.unregister(waker);
        }
    }
}

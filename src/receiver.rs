use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll, Waker};

use crate::channel::{ChannelInner, RecvAttempt, WaitNode};
use crate::deadline::Deadline;
use crate::error::{ChanError, TryRecvError};

/// The receiving half of a channel created by [`channel`](crate::channel).
///
/// Cloning and dropping behave symmetrically to [`Sender`](crate::Sender):
/// the channel is marked done once every `Receiver` clone has dropped.
pub struct Receiver<T> {
    pub(crate) inner: Arc<ChannelInner<T>>,
}

impl<T> Receiver<T> {
    pub(crate) fn new(inner: Arc<ChannelInner<T>>) -> Self {
        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Attempts to receive without suspending. Fails with
    /// [`TryRecvError::Empty`] if neither the buffer nor a waiting
    /// sender has a value ready, or [`TryRecvError::Disconnected`] once
    /// the channel is done or closed and drained.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.inner.attempt_recv(None) {
            RecvAttempt::Received(v) => Ok(v),
            RecvAttempt::Closed => Err(TryRecvError::Disconnected),
            RecvAttempt::Empty => Err(TryRecvError::Empty),
            RecvAttempt::Parked(_) => unreachable!("attempt_recv never parks without a waker"),
        }
    }

    /// Receives a value, suspending until one is available or the
    /// channel becomes done.
    pub async fn recv(&self) -> Result<T, ChanError> {
        self.recv_deadline(Deadline::Never).await
    }

    /// Receives a value, suspending at most until `deadline`.
    pub async fn recv_deadline(&self, deadline: Deadline) -> Result<T, ChanError> {
        if self.inner.shutdown.is_triggered() {
            return Err(ChanError::Canceled);
        }
        match deadline {
            Deadline::Immediate => self.try_recv().map_err(Into::into),
            Deadline::Never => RecvFuture::new(&self.inner).await,
            Deadline::At(at) => match tokio::time::timeout_at(at, RecvFuture::new(&self.inner)).await {
                Ok(result) => result,
                Err(_) => Err(ChanError::TimedOut),
            },
        }
    }

    /// Marks the channel done. Errs if already done.
    pub fn done(&self) -> Result<(), ChanError> {
        self.inner.done()
    }

    /// Marks the channel closed, discarding any buffered elements.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.inner.rx_count.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if self.inner.rx_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.mark_done_on_last_handle_drop();
        }
    }
}

/// Future returned by [`Receiver::recv`]/[`Receiver::recv_deadline`].
///
/// Its `Drop` impl unparks the wait node the same way
/// [`SendFuture`](crate::sender::SendFuture) does, for the same
/// cancel-safety reason.
pub(crate) struct RecvFuture<'a, T> {
    inner: &'a ChannelInner<T>,
    state: RecvState<T>,
}

enum RecvState<T> {
    Initial,
    Parked(Arc<WaitNode<T>>, Waker),
    Done,
}

impl<'a, T> RecvFuture<'a, T> {
    pub(crate) fn new(inner: &'a ChannelInner<T>) -> Self {
        Self {
            inner,
            state: RecvState::Initial,
        }
    }
}

impl<'a, T> Future for RecvFuture<'a, T> {
    type Output = Result<T, ChanError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                RecvState::Initial => match this.inner.attempt_recv(Some(cx.waker())) {
                    RecvAttempt::Received(v) => {
                        this.state = RecvState::Done;
                        return Poll::Ready(Ok(v));
                    }
                    RecvAttempt::Closed => {
                        this.state = RecvState::Done;
                        return Poll::Ready(Err(ChanError::BrokenPipe));
                    }
                    RecvAttempt::Empty => unreachable!("a waker was supplied"),
                    RecvAttempt::Parked(node) => {
                        let waker = cx.waker().clone();
                        this.inner.shutdown.register(&waker);
                        if this.inner.shutdown.is_triggered() {
                            this.inner.unpark_receiver(&node);
                            this.inner.shutdown.unregister(&waker);
                            this.state = RecvState::Done;
                            return Poll::Ready(Err(ChanError::Canceled));
                        }
                        this.state = RecvState::Parked(node, waker);
                        return Poll::Pending;
                    }
                },
                RecvState::Parked(node, waker) => {
                    if this.inner.shutdown.is_triggered() {
                        this.inner.unpark_receiver(node);
                        this.inner.shutdown.unregister(waker);
                        this.state = RecvState::Done;
                        return Poll::Ready(Err(ChanError::Canceled));
                    }
                    if !waker.will_wake(cx.waker()) {
                        this.inner.shutdown.unregister(waker);
                        *waker = cx.waker().clone();
                        this.inner.shutdown.register(waker);
                    }
                    return match node.poll(cx.waker()) {
                        Poll::Ready(Ok(value)) => {
                            let value = value.expect("recv node resolved without a value");
                            this.inner.shutdown.unregister(waker);
                            this.state = RecvState::Done;
                            Poll::Ready(Ok(value))
                        }
                        Poll::Ready(Err(e)) => {
                            this.inner.shutdown.unregister(waker);
                            this.state = RecvState::Done;
                            Poll::Ready(Err(e))
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                RecvState::Done => panic!("RecvFuture polled after completion"),
            }
        }
    }
}

impl<'a, T> Drop for RecvFuture<'a, T> {
    fn drop(&mut self) {
        if let RecvState::Parked(node, waker) = &self.state {
            self.inner.unpark_receiver(node);
            self.inner.shutdown.unregister(waker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{channel, channel_with_shutdown};
    use crate::runtime::Shutdown;

    #[tokio::test]
    async fn recv_waits_for_buffered_fifo_order() {
        let (tx, rx) = channel::<i32>(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recv_deadline_times_out_on_empty_channel() {
        let (_tx, rx) = channel::<i32>(1);
        let deadline = Deadline::after(std::time::Duration::from_millis(20));
        let result = rx.recv_deadline(deadline).await;
        assert!(matches!(result, Err(ChanError::TimedOut)));
    }

    #[tokio::test]
    async fn done_drains_buffer_but_close_does_not() {
        let (tx, rx) = channel::<i32>(4);
        tx.send(1).await.unwrap();
        tx.done().unwrap();
        assert_eq!(rx.recv().await.unwrap(), 1);
        assert!(matches!(rx.recv().await, Err(ChanError::BrokenPipe)));

        let (tx2, rx2) = channel::<i32>(4);
        tx2.send(1).await.unwrap();
        tx2.close();
        assert!(matches!(rx2.recv().await, Err(ChanError::BrokenPipe)));
    }

    #[tokio::test]
    async fn shutdown_trigger_wakes_an_already_parked_receiver() {
        let shutdown = Shutdown::new();
        let (_tx, rx) = channel_with_shutdown::<i32>(0, shutdown.clone()).unwrap();
        let receiver = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        shutdown.trigger();
        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(ChanError::Canceled)));
    }

    #[tokio::test]
    async fn last_receiver_drop_marks_channel_done() {
        let (tx, rx) = channel::<i32>(0);
        drop(rx);
        assert!(matches!(tx.send(1).await, Err(ChanError::BrokenPipe)));
    }
}

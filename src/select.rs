//! Multi-way `choose` over a mix of send and receive clauses.
//!
//! A builder collects type-erased clauses, then races them with a
//! single `.await`.
//!
//! # Fairness and ordering
//!
//! A `choose` over clauses `[c0, c1, ..., cn]` resolves the lowest-
//! indexed clause that is immediately satisfiable. If none are, every
//! clause parks and whichever is fulfilled first by some peer wins,
//! with ties (simultaneous wakeups) broken in list order — a linear,
//! index-ordered scan of the clause list.
//!
//! Completing this scan and parking what remains must happen as one
//! atomic step: if each clause's channel were probed and parked in two
//! separate critical sections, a peer could arrive in the gap between
//! probing clause 0 and parking clause 1, and the wakeup would be lost
//! forever. `SelectFuture::poll` below closes that gap by treating a
//! single `poll` call as the atomic unit: either it finds a winner on
//! this pass, or every clause is left registered with the same waker
//! before returning `Pending`.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::channel::{ChannelInner, RecvAttempt, SendAttempt, WaitNode};
use crate::deadline::Deadline;
use crate::error::{ChanError, SelectError};
use crate::runtime::Shutdown;

/// One clause of a [`Select`], type-erased so clauses over different
/// element types can share a single `Vec`.
///
/// All methods take `&self` rather than `&mut self`: `Select::choose`
/// holds a `Vec<Box<dyn SelectBranch>>` and needs to poll each clause
/// behind a shared reference while a `SelectFuture` borrows the whole
/// vector. Each implementor uses a `Cell` to track its own parked node.
trait SelectBranch {
    /// Tries to fire without parking. `Ok(true)` means this clause fired.
    fn try_fire(&self) -> Result<bool, ChanError>;
    /// Parks this clause on its channel's waitqueue, registering `waker`.
    /// A peer can still race in between phase 1's `try_fire` and this
    /// call, so `park` itself can also resolve immediately — `Some`
    /// means it did, `None` means the clause is now truly parked.
    fn park(&self, waker: &std::task::Waker) -> Option<Result<(), ChanError>>;
    /// Polls this clause's parked node, if any.
    fn poll_parked(&self, waker: &std::task::Waker) -> Option<Result<(), ChanError>>;
    /// Removes this clause's node from its channel's waitqueue, if parked.
    fn unpark(&self);
    /// The shutdown token of this clause's channel.
    fn shutdown(&self) -> &Shutdown;
}

struct SendClause<'a, T> {
    inner: &'a ChannelInner<T>,
    value: Cell<Option<T>>,
    node: Cell<Option<Arc<WaitNode<T>>>>,
}

impl<'a, T> SelectBranch for SendClause<'a, T> {
    fn try_fire(&self) -> Result<bool, ChanError> {
        let value = self.value.take().expect("clause polled after completion");
        match self.inner.attempt_send(value, None) {
            SendAttempt::Sent => Ok(true),
            SendAttempt::Closed(_) => Err(ChanError::BrokenPipe),
            SendAttempt::WouldBlock(v) => {
                self.value.set(Some(v));
                Ok(false)
            }
            SendAttempt::Parked(_) => unreachable!("attempt_send never parks without a waker"),
        }
    }

    fn park(&self, waker: &std::task::Waker) -> Option<Result<(), ChanError>> {
        let value = self.value.take().expect("clause parked after completion");
        match self.inner.attempt_send(value, Some(waker)) {
            SendAttempt::Parked(node) => {
                self.node.set(Some(node));
                None
            }
            SendAttempt::Sent => Some(Ok(())),
            SendAttempt::Closed(_) => Some(Err(ChanError::BrokenPipe)),
            SendAttempt::WouldBlock(_) => unreachable!("a waker was supplied"),
        }
    }

    fn poll_parked(&self, waker: &std::task::Waker) -> Option<Result<(), ChanError>> {
        let node = self.node.take()?;
        match node.poll(waker) {
            Poll::Ready(result) => Some(result.map(|_| ())),
            Poll::Pending => {
                self.node.set(Some(node));
                None
            }
        }
    }

    fn unpark(&self) {
        if let Some(node) = self.node.take() {
            self.inner.unpark_sender(&node);
        }
    }

    fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }
}

struct RecvClause<'a, T> {
    inner: &'a ChannelInner<T>,
    out: &'a Cell<Option<T>>,
    node: Cell<Option<Arc<WaitNode<T>>>>,
}

impl<'a, T> SelectBranch for RecvClause<'a, T> {
    fn try_fire(&self) -> Result<bool, ChanError> {
        match self.inner.attempt_recv(None) {
            RecvAttempt::Received(v) => {
                self.out.set(Some(v));
                Ok(true)
            }
            RecvAttempt::Closed => Err(ChanError::BrokenPipe),
            RecvAttempt::Empty => Ok(false),
            RecvAttempt::Parked(_) => unreachable!("attempt_recv never parks without a waker"),
        }
    }

    fn park(&self, waker: &std::task::Waker) -> Option<Result<(), ChanError>> {
        match self.inner.attempt_recv(Some(waker)) {
            RecvAttempt::Parked(node) => {
                self.node.set(Some(node));
                None
            }
            RecvAttempt::Received(v) => {
                self.out.set(Some(v));
                Some(Ok(()))
            }
            RecvAttempt::Closed => Some(Err(ChanError::BrokenPipe)),
            RecvAttempt::Empty => unreachable!("a waker was supplied"),
        }
    }

    fn poll_parked(&self, waker: &std::task::Waker) -> Option<Result<(), ChanError>> {
        let node = self.node.take()?;
        match node.poll(waker) {
            Poll::Ready(Ok(value)) => {
                self.out.set(value);
                Some(Ok(()))
            }
            Poll::Ready(Err(e)) => Some(Err(e)),
            Poll::Pending => {
                self.node.set(Some(node));
                None
            }
        }
    }

    fn unpark(&self) {
        if let Some(node) = self.node.take() {
            self.inner.unpark_receiver(&node);
        }
    }

    fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }
}

/// Builds a multi-way `choose` over a mix of send and receive clauses.
///
/// ```ignore
/// let out = Cell::new(None);
/// let won = Select::new()
///     .recv(&rx1, &out)
///     .send(&tx2, 7)
///     .choose()
///     .await?;
/// ```
pub struct Select<'a> {
    branches: Vec<Box<dyn SelectBranch + 'a>>,
}

impl<'a> Default for Select<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Select<'a> {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
        }
    }

    /// Adds a send clause for `value` on `sender`.
    pub fn send<T: 'a>(mut self, sender: &'a crate::Sender<T>, value: T) -> Self {
        self.branches.push(Box::new(SendClause {
            inner: &sender.inner,
            value: Cell::new(Some(value)),
            node: Cell::new(None),
        }));
        self
    }

    /// Adds a receive clause on `receiver`. The received value, if this
    /// clause wins, is written into `out`.
    pub fn recv<T: 'a>(mut self, receiver: &'a crate::Receiver<T>, out: &'a Cell<Option<T>>) -> Self {
        self.branches.push(Box::new(RecvClause {
            inner: &receiver.inner,
            out,
            node: Cell::new(None),
        }));
        self
    }

    /// Resolves the selection, suspending indefinitely if no clause is
    /// immediately ready. Returns the index of the clause that fired.
    pub async fn choose(self) -> Result<usize, SelectError> {
        self.choose_deadline(Deadline::Never).await
    }

    /// Resolves the selection, suspending at most until `deadline`.
    /// Returns the index (into the order clauses were added) of the
    /// clause that fired.
    pub async fn choose_deadline(self, deadline: Deadline) -> Result<usize, SelectError> {
        if self.branches.is_empty() {
            return Err(SelectError::global(ChanError::InvalidArgument));
        }
        if self.branches.iter().any(|b| b.shutdown().is_triggered()) {
            return Err(SelectError::global(ChanError::Canceled));
        }
        match deadline {
            Deadline::Immediate => SelectFuture::new(&self.branches).try_fire_once(),
            Deadline::Never => SelectFuture::new(&self.branches).await,
            Deadline::At(at) => match tokio::time::timeout_at(at, SelectFuture::new(&self.branches)).await {
                Ok(result) => result,
                Err(_) => Err(SelectError::global(ChanError::TimedOut)),
            },
        }
    }
}

struct SelectFuture<'a, 'b> {
    branches: &'a [Box<dyn SelectBranch + 'b>],
    parked: bool,
    registered_waker: Option<Waker>,
}

impl<'a, 'b> SelectFuture<'a, 'b> {
    fn new(branches: &'a [Box<dyn SelectBranch + 'b>]) -> Self {
        Self {
            branches,
            parked: false,
            registered_waker: None,
        }
    }

    fn try_fire_once(self) -> Result<usize, SelectError> {
        for (i, branch) in self.branches.iter().enumerate() {
            match branch.try_fire() {
                Ok(true) => return Ok(i),
                Ok(false) => continue,
                Err(e) => return Err(SelectError::clause(i, e)),
            }
        }
        Err(SelectError::global(ChanError::TimedOut))
    }

    fn unregister_shutdowns(&mut self) {
        if let Some(waker) = self.registered_waker.take() {
            for branch in self.branches.iter() {
                branch.shutdown().unregister(&waker);
            }
        }
    }
}

impl<'a, 'b> Future for SelectFuture<'a, 'b> {
    type Output = Result<usize, SelectError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.branches.iter().any(|b| b.shutdown().is_triggered()) {
            if this.parked {
                for branch in this.branches.iter() {
                    branch.unpark();
                }
                this.unregister_shutdowns();
            }
            this.parked = false;
            return Poll::Ready(Err(SelectError::global(ChanError::Canceled)));
        }

        if this.parked {
            // Every branch is already registered from the previous poll.
            // The runtime only wakes us once some branch's node resolved,
            // but we re-scan in list order so a simultaneous multi-wakeup
            // still breaks ties deterministically.
            for (i, branch) in this.branches.iter().enumerate() {
                if let Some(result) = branch.poll_parked(cx.waker()) {
                    for other in this.branches.iter() {
                        other.unpark();
                    }
                    this.unregister_shutdowns();
                    this.parked = false;
                    return Poll::Ready(result.map(|_| i).map_err(|e| SelectError::clause(i, e)));
                }
            }
            return Poll::Pending;
        }

        // Phase 1: a non-parking linear probe. The first clause that can
        // fire immediately wins, regardless of how many others could
        // also fire — list order is the tie-break.
        for (i, branch) in this.branches.iter().enumerate() {
            match branch.try_fire() {
                Ok(true) => return Poll::Ready(Ok(i)),
                Ok(false) => continue,
                Err(e) => return Poll::Ready(Err(SelectError::clause(i, e))),
            }
        }

        // Phase 2: nothing fired outright. Park every clause under the
        // same waker in one pass so no wakeup arriving between phase 1
        // and here can be missed. `park` itself has a real side effect —
        // it can complete a transfer — so the loop stops at the first
        // clause that resolves immediately instead of probing the rest;
        // only clauses visited before the winner end up parked, and they
        // (along with the winner, a no-op if it never parked) are then
        // all unparked together.
        let mut winner = None;
        for (i, branch) in this.branches.iter().enumerate() {
            if let Some(result) = branch.park(cx.waker()) {
                winner = Some((i, result));
                break;
            }
        }
        if let Some((i, result)) = winner {
            for branch in this.branches.iter() {
                branch.unpark();
            }
            return Poll::Ready(result.map(|_| i).map_err(|e| SelectError::clause(i, e)));
        }
        let waker = cx.waker().clone();
        for branch in this.branches.iter() {
            branch.shutdown().register(&waker);
        }
        this.registered_waker = Some(waker);
        this.parked = true;
        Poll::Pending
    }
}

impl<'a, 'b> Drop for SelectFuture<'a, 'b> {
    fn drop(&mut self) {
        if self.parked {
            for branch in self.branches.iter() {
                branch.unpark();
            }
            self.unregister_shutdowns();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;

    #[tokio::test]
    async fn choose_picks_the_first_ready_clause_in_list_order() {
        let (tx1, rx1) = channel::<i32>(1);
        let (tx2, rx2) = channel::<i32>(1);
        tx1.send(1).await.unwrap();
        tx2.send(2).await.unwrap();

        let out1 = Cell::new(None);
        let out2 = Cell::new(None);
        let won = Select::new()
            .recv(&rx1, &out1)
            .recv(&rx2, &out2)
            .choose()
            .await
            .unwrap();

        assert_eq!(won, 0);
        assert_eq!(out1.take(), Some(1));
        assert_eq!(out2.take(), None);
    }

    #[tokio::test]
    async fn choose_wakes_on_whichever_clause_fills_first() {
        let (tx1, rx1) = channel::<i32>(0);
        let (_tx2, rx2) = channel::<i32>(0);

        let sender = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tx1.send(99).await
        });

        let out1 = Cell::new(None);
        let out2 = Cell::new(None);
        let won = Select::new()
            .recv(&rx1, &out1)
            .recv(&rx2, &out2)
            .choose()
            .await
            .unwrap();

        assert_eq!(won, 0);
        assert_eq!(out1.take(), Some(99));
        sender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn choose_deadline_times_out_when_nothing_is_ready() {
        let (_tx, rx) = channel::<i32>(0);
        let out = Cell::new(None);
        let deadline = Deadline::after(std::time::Duration::from_millis(15));
        let result = Select::new().recv(&rx, &out).choose_deadline(deadline).await;
        assert!(matches!(
            result,
            Err(SelectError {
                index: None,
                error: ChanError::TimedOut
            })
        ));
    }

    #[tokio::test]
    async fn choose_with_no_clauses_is_invalid() {
        let result: Result<usize, SelectError> = Select::new().choose().await;
        assert!(matches!(
            result,
            Err(SelectError {
                index: None,
                error: ChanError::InvalidArgument
            })
        ));
    }

    #[tokio::test]
    async fn choose_reports_the_clause_index_of_a_done_channel() {
        let (tx, rx) = channel::<i32>(0);
        drop(tx);
        let out = Cell::new(None);
        let result = Select::new().recv(&rx, &out).choose().await;
        assert!(matches!(
            result,
            Err(SelectError {
                index: Some(0),
                error: ChanError::BrokenPipe
            })
        ));
    }

    #[tokio::test]
    async fn choose_reports_canceled_when_shutdown_triggers_while_parked() {
        let shutdown = Shutdown::new();
        let (_tx, rx) = crate::channel::channel_with_shutdown::<i32>(0, shutdown.clone()).unwrap();
        let out = Cell::new(None);
        let waiter = tokio::spawn(async move { Select::new().recv(&rx, &out).choose().await });
        tokio::task::yield_now().await;
        shutdown.trigger();
        let result = waiter.await.unwrap();
        assert!(matches!(
            result,
            Err(SelectError {
                index: None,
                error: ChanError::Canceled
            })
        ));
    }

    #[tokio::test]
    async fn choose_can_mix_send_and_recv_clauses() {
        let (tx1, rx1) = channel::<i32>(1);
        let (tx2, rx2) = channel::<i32>(0);
        tx1.send(5).await.unwrap();

        let out1 = Cell::new(None);
        let won = Select::new()
            .recv(&rx1, &out1)
            .send(&tx2, 7)
            .choose()
            .await
            .unwrap();

        assert_eq!(won, 0);
        assert_eq!(out1.take(), Some(5));
        drop(rx2);
    }
}

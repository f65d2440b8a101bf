//! Shared channel state: the ring buffer, the two waitqueues, and the
//! wait-node type parked on them.
//!
//! State lives behind one `Mutex<State<T>>` guarding a `VecDeque`-backed
//! ring buffer and both waitqueues together, rather than a pair of
//! atomic head/tail cursors, since this channel serves an arbitrary
//! number of senders and receivers parked concurrently rather than
//! exactly one of each. Every fast path below is a single critical
//! section, which is what gives `choose` (select.rs) its atomicity
//! guarantee per clause.

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use std::task::Waker;

use crossbeam_utils::CachePadded;

use crate::error::ChanError;
use crate::receiver::Receiver;
use crate::runtime::Shutdown;
use crate::sender::Sender;

/// A slot shared between a parked clause's `Future` and the peer that
/// eventually fulfills it.
///
/// For a SEND clause, `payload` starts as `Some(value)` and is taken by
/// the receiver that completes the handoff. For a RECV clause, `payload`
/// starts `None` and is filled in by the sender that completes the
/// handoff. Either way, `outcome` is written exactly once, by whichever
/// side resolves the clause (a matching peer, `done`, `close`, or a
/// `choose` sibling committing to a different clause never touches
/// `outcome` — it only calls [`unpark`](ChannelInner::unpark_sender)).
pub(crate) struct WaitNode<T> {
    inner: Mutex<NodeState<T>>,
}

struct NodeState<T> {
    payload: Option<T>,
    waker: Option<Waker>,
    outcome: Option<Result<(), ChanError>>,
}

impl<T> WaitNode<T> {
    fn for_send(value: T) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(NodeState {
                payload: Some(value),
                waker: None,
                outcome: None,
            }),
        })
    }

    fn for_recv() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(NodeState {
                payload: None,
                waker: None,
                outcome: None,
            }),
        })
    }

    pub(crate) fn register(&self, waker: &Waker) {
        let mut g = self.inner.lock().unwrap();
        if !g.waker.as_ref().is_some_and(|w| w.will_wake(waker)) {
            g.waker = Some(waker.clone());
        }
    }

    /// A receiver takes a parked sender's payload, completing the handoff.
    pub(crate) fn take_for_handoff(&self) -> T {
        let mut g = self.inner.lock().unwrap();
        let value = g.payload.take().expect("send node handed off twice");
        g.outcome = Some(Ok(()));
        if let Some(w) = g.waker.take() {
            w.wake();
        }
        value
    }

    /// A sender deposits a value into a parked receiver, completing the handoff.
    pub(crate) fn deposit(&self, value: T) {
        let mut g = self.inner.lock().unwrap();
        g.payload = Some(value);
        g.outcome = Some(Ok(()));
        if let Some(w) = g.waker.take() {
            w.wake();
        }
    }

    /// `done`/`close`/last-handle-drop resolve every still-pending node
    /// with `BrokenPipe`. A node already resolved by a peer is left alone.
    pub(crate) fn resolve_broken(&self) {
        let mut g = self.inner.lock().unwrap();
        if g.outcome.is_none() {
            g.outcome = Some(Err(ChanError::BrokenPipe));
            if let Some(w) = g.waker.take() {
                w.wake();
            }
        }
    }

    /// Polls this node's resolution. `Ok(Some(value))` is only produced
    /// for a RECV node (the deposited value); a resolved SEND node
    /// produces `Ok(None)`.
    pub(crate) fn poll(&self, waker: &Waker) -> std::task::Poll<Result<Option<T>, ChanError>> {
        use std::task::Poll;
        let mut g = self.inner.lock().unwrap();
        match g.outcome {
            Some(Ok(())) => Poll::Ready(Ok(g.payload.take())),
            Some(Err(e)) => Poll::Ready(Err(e)),
            None => {
                if !g.waker.as_ref().is_some_and(|w| w.will_wake(waker)) {
                    g.waker = Some(waker.clone());
                }
                Poll::Pending
            }
        }
    }
}

pub(crate) struct State<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    senders: VecDeque<Arc<WaitNode<T>>>,
    receivers: VecDeque<Arc<WaitNode<T>>>,
    done: bool,
}

/// Outcome of a non-parking or parking send attempt against [`ChannelInner::attempt_send`].
pub(crate) enum SendAttempt<T> {
    Sent,
    Closed(T),
    WouldBlock(T),
    Parked(Arc<WaitNode<T>>),
}

/// Outcome of a non-parking or parking receive attempt against [`ChannelInner::attempt_recv`].
pub(crate) enum RecvAttempt<T> {
    Received(T),
    Closed,
    Empty,
    Parked(Arc<WaitNode<T>>),
}

pub(crate) struct ChannelInner<T> {
    state: CachePadded<Mutex<State<T>>>,
    pub(crate) shutdown: Shutdown,
    pub(crate) tx_count: AtomicUsize,
    pub(crate) rx_count: AtomicUsize,
}

impl<T> ChannelInner<T> {
    pub(crate) fn new(capacity: usize, shutdown: Shutdown) -> Arc<Self> {
        #[cfg(feature = "tracing")]
        tracing::trace!(capacity, "channel created");
        Arc::new(Self {
            state: CachePadded::new(Mutex::new(State {
                buffer: VecDeque::with_capacity(capacity.min(4096)),
                capacity,
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
                done: false,
            })),
            shutdown,
            tx_count: AtomicUsize::new(1),
            rx_count: AtomicUsize::new(1),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.state.lock().unwrap().capacity
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.lock().unwrap().done
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }

    /// Non-parking fast-path attempt (`park = None`), or an atomic
    /// check-then-park (`park = Some(waker)`). Both share one critical
    /// section so no state change can be observed between the check and
    /// the commit/park — the race `choose`'s "linear probe, then park"
    /// two-pass structure must also avoid (SPEC_FULL.md §4.5).
    pub(crate) fn attempt_send(&self, value: T, park: Option<&Waker>) -> SendAttempt<T> {
        let mut state = self.state.lock().unwrap();
        if state.done {
            return SendAttempt::Closed(value);
        }
        if let Some(node) = state.receivers.pop_front() {
            drop(state);
            node.deposit(value);
            #[cfg(feature = "tracing")]
            tracing::trace!("direct handoff: send matched a waiting receiver");
            return SendAttempt::Sent;
        }
        if state.buffer.len() < state.capacity {
            state.buffer.push_back(value);
            return SendAttempt::Sent;
        }
        match park {
            None => SendAttempt::WouldBlock(value),
            Some(waker) => {
                let node = WaitNode::for_send(value);
                node.register(waker);
                state.senders.push_back(node.clone());
                #[cfg(feature = "tracing")]
                tracing::trace!("sender parked");
                SendAttempt::Parked(node)
            }
        }
    }

    pub(crate) fn attempt_recv(&self, park: Option<&Waker>) -> RecvAttempt<T> {
        let mut state = self.state.lock().unwrap();
        if let Some(value) = state.buffer.pop_front() {
            // A buffer slot just freed. Promote the oldest parked sender's
            // payload into it *before releasing the lock*: otherwise a
            // concurrent send could slip into the freed slot ahead of a
            // sender that was already waiting, breaking end-to-end FIFO.
            if let Some(node) = state.senders.pop_front() {
                let promoted = node.take_for_handoff();
                state.buffer.push_back(promoted);
            }
            return RecvAttempt::Received(value);
        }
        if let Some(node) = state.senders.pop_front() {
            drop(state);
            let value = node.take_for_handoff();
            #[cfg(feature = "tracing")]
            tracing::trace!("rendezvous: recv matched a waiting sender");
            return RecvAttempt::Received(value);
        }
        if state.done {
            return RecvAttempt::Closed;
        }
        match park {
            None => RecvAttempt::Empty,
            Some(waker) => {
                let node = WaitNode::for_recv();
                node.register(waker);
                state.receivers.push_back(node.clone());
                #[cfg(feature = "tracing")]
                tracing::trace!("receiver parked");
                RecvAttempt::Parked(node)
            }
        }
    }

    pub(crate) fn unpark_sender(&self, node: &Arc<WaitNode<T>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.senders.iter().position(|n| Arc::ptr_eq(n, node)) {
            state.senders.remove(pos);
        }
    }

    pub(crate) fn unpark_receiver(&self, node: &Arc<WaitNode<T>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.receivers.iter().position(|n| Arc::ptr_eq(n, node)) {
            state.receivers.remove(pos);
        }
    }

    fn drain_waiters(state: &mut State<T>) -> (VecDeque<Arc<WaitNode<T>>>, VecDeque<Arc<WaitNode<T>>>) {
        (
            std::mem::take(&mut state.senders),
            std::mem::take(&mut state.receivers),
        )
    }

    fn wake_drained(senders: VecDeque<Arc<WaitNode<T>>>, receivers: VecDeque<Arc<WaitNode<T>>>) {
        for n in senders.iter().chain(receivers.iter()) {
            n.resolve_broken();
        }
    }

    pub(crate) fn done(&self) -> Result<(), ChanError> {
        let mut state = self.state.lock().unwrap();
        if state.done {
            return Err(ChanError::BrokenPipe);
        }
        state.done = true;
        let (s, r) = Self::drain_waiters(&mut state);
        drop(state);
        Self::wake_drained(s, r);
        #[cfg(feature = "tracing")]
        tracing::debug!("channel marked done");
        Ok(())
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        state.buffer.clear();
        let (s, r) = Self::drain_waiters(&mut state);
        drop(state);
        Self::wake_drained(s, r);
        #[cfg(feature = "tracing")]
        tracing::debug!("channel closed");
    }

    /// Invoked when the last `Sender` or last `Receiver` handle drops.
    /// Unlike [`done`](Self::done) this never errors on an
    /// already-done channel, and unlike [`close`](Self::close) it never
    /// drops buffered elements — the other side should still be able to
    /// drain them. See DESIGN.md for the rationale.
    pub(crate) fn mark_done_on_last_handle_drop(&self) {
        let mut state = self.state.lock().unwrap();
        if state.done {
            return;
        }
        state.done = true;
        let (s, r) = Self::drain_waiters(&mut state);
        drop(state);
        Self::wake_drained(s, r);
        #[cfg(feature = "tracing")]
        tracing::debug!("last handle dropped, channel marked done");
    }
}

/// Creates a new channel with the given buffer `capacity`. A capacity of
/// `0` makes every send wait for a matching receiver (pure rendezvous);
/// a positive capacity lets up to that many elements queue without a
/// receiver present.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let inner = ChannelInner::new(capacity, Shutdown::new());
    (Sender::new(inner.clone()), Receiver::new(inner))
}

/// Like [`channel`], but ties the channel to an externally-owned
/// [`Shutdown`] token: every blocking call on either handle fails fast
/// with [`ChanError::Canceled`] once the token is triggered, without
/// needing to touch this channel's own state.
///
/// Errs with [`ChanError::Canceled`] if `shutdown` is already triggered,
/// and with [`ChanError::InvalidArgument`] if `capacity` would overflow
/// a `VecDeque`'s internal growth arithmetic; in practice the latter
/// cannot happen for any `capacity` that fits in memory, but construction
/// stays fallible so callers don't have to special-case this constructor
/// relative to other fallible channel operations.
pub fn channel_with_shutdown<T>(
    capacity: usize,
    shutdown: Shutdown,
) -> Result<(Sender<T>, Receiver<T>), ChanError> {
    if shutdown.is_triggered() {
        return Err(ChanError::Canceled);
    }
    if capacity == usize::MAX {
        return Err(ChanError::InvalidArgument);
    }
    let inner = ChannelInner::new(capacity, shutdown);
    Ok((Sender::new(inner.clone()), Receiver::new(inner)))
}

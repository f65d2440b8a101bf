use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Waker;

/// A cooperative signal that the surrounding runtime is shutting down.
///
/// Every blocking entry point (`send`, `recv`, `choose`, `create`)
/// checks this first, before touching any channel state. A call already
/// parked when the token triggers is woken the same way a timeout wakes
/// it — via the wakers registered with [`register`](Self::register) —
/// and resolves with `Canceled` instead of waiting on an unrelated peer
/// or deadline.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

impl Shutdown {
    /// A token that never triggers; the default for channels created
    /// without an explicit runtime shutdown signal.
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            triggered: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
        }))
    }

    /// Marks the runtime as shutting down and wakes every call parked
    /// against this token. Idempotent.
    pub fn trigger(&self) {
        self.0.triggered.store(true, Ordering::Release);
        for waker in std::mem::take(&mut *self.0.wakers.lock().unwrap()) {
            waker.wake();
        }
    }

    /// True once [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        self.0.triggered.load(Ordering::Acquire)
    }

    /// Registers `waker` to be woken by [`trigger`](Self::trigger).
    pub(crate) fn register(&self, waker: &Waker) {
        let mut wakers = self.0.wakers.lock().unwrap();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    /// Removes a waker previously passed to [`register`](Self::register),
    /// once its call has resolved or been cancelled.
    pub(crate) fn unregister(&self, waker: &Waker) {
        self.0.wakers.lock().unwrap().retain(|w| !w.will_wake(waker));
    }
}

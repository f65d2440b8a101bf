//! CSP-style typed channels with multi-way select
//!
//! A bounded or rendezvous channel for cooperatively-scheduled async
//! tasks, generalized from a single-producer/single-consumer ring
//! buffer design into a multi-producer/multi-consumer one that also
//! supports racing several channels at once with [`Select`].
//!
//! ## How It Works
//!
//!```text
//!        senders                         receivers
//!   ┌───┐ ┌───┐ ┌───┐                 ┌───┐ ┌───┐ ┌───┐
//!   │ A │ │ B │ │ C │                 │ X │ │ Y │ │ Z │
//!   └─┬─┘ └─┬─┘ └─┬─┘                 └─┬─┘ └─┬─┘ └─┬─┘
//!     │     │     │     ┌─────────┐     │     │     │
//!     └─────┴─────┴────▶│  buffer │◀────┴─────┴─────┘
//!                       │ (VecDeque) │
//!                       └─────────┘
//!           waiting senders    waiting receivers
//!           (rendezvous when capacity == 0)
//!```
//!
//! - `capacity == 0` makes every [`Sender::send`] wait for a matching
//!   [`Receiver::recv`] — a pure rendezvous, handed off value to value.
//! - `capacity > 0` lets up to that many elements queue without a
//!   receiver present; once full, senders park exactly as in the
//!   rendezvous case.
//! - Elements always leave in the order they were sent, whether they
//!   passed through the buffer or were handed off directly.
//!
//! ## Synchronization
//!
//! Unlike a lock-free SPSC ring buffer, this channel serves an
//! unbounded number of senders and receivers parked concurrently, so
//! its state lives behind one [`Mutex`](std::sync::Mutex) rather than a
//! pair of atomic cursors. The mutex is cache-padded
//! ([`CachePadded`](crossbeam_utils::CachePadded)) to keep it off the
//! same cache line as neighboring fields, and every operation —
//! including the non-parking fast path and the atomic park-or-commit
//! used by [`choose`](Select::choose) — is a single critical section,
//! so no wakeup can be lost between a capacity check and a park.
//!
//! ## Select
//!
//! [`Select`] races a list of send/receive clauses across possibly
//! different element types and channels, resolving the first clause
//! that becomes ready (ties broken by list order):
//!
//!```
//! use std::cell::Cell;
//! use rendezvous::{channel, Select};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (tx1, rx1) = channel::<i32>(1);
//! let (_tx2, rx2) = channel::<i32>(1);
//! tx1.try_send(7).unwrap();
//!
//! let out1 = Cell::new(None);
//! let out2 = Cell::new(None);
//! let won = Select::new()
//!     .recv(&rx1, &out1)
//!     .recv(&rx2, &out2)
//!     .choose()
//!     .await
//!     .unwrap();
//! assert_eq!(won, 0);
//! assert_eq!(out1.take(), Some(7));
//! # }
//!```
//!
//! ## Example
//!
//!```
//! use rendezvous::channel;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (tx, rx) = channel::<i32>(4);
//!
//! tx.send(1).await.unwrap();
//! tx.send(2).await.unwrap();
//!
//! assert_eq!(rx.recv().await.unwrap(), 1);
//! assert_eq!(rx.recv().await.unwrap(), 2);
//! # }
//!```

mod channel;
mod deadline;
mod error;
mod receiver;
mod runtime;
mod select;
mod sender;

pub use channel::{channel, channel_with_shutdown};
pub use deadline::Deadline;
pub use error::{ChanError, SelectError, TryRecvError, TrySendError};
pub use receiver::Receiver;
pub use runtime::Shutdown;
pub use select::Select;
pub use sender::Sender;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Inter-task communication check, mirroring a plain producer/consumer
    /// over a buffered channel.
    #[tokio::test]
    async fn buffered_roundtrip_across_tasks() {
        let (tx, rx) = channel::<String>(2);

        let words = [
            String::from("hello"),
            String::from("world"),
            String::from("!"),
        ];

        let words_c = words.clone();
        let sender = tokio::spawn(async move {
            for w in words_c {
                tx.send(w).await.unwrap();
            }
        });

        for w in words {
            assert_eq!(rx.recv().await.unwrap(), w);
        }
        sender.await.unwrap();
    }

    #[derive(Debug, Clone)]
    struct DropCounter(Arc<AtomicUsize>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Buffered elements still get dropped when both handles go away.
    #[tokio::test]
    async fn drop_clears_unread_buffered_items() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dropper = DropCounter(counter.clone());

        let (tx, rx) = channel::<DropCounter>(4);
        tx.try_send(dropper.clone()).unwrap();
        tx.try_send(dropper).unwrap();
        drop(tx);
        drop(rx);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_token_cancels_pending_calls() {
        let shutdown = Shutdown::new();
        let (tx, rx) = channel_with_shutdown::<i32>(0, shutdown.clone()).unwrap();
        shutdown.trigger();

        assert!(matches!(tx.send(1).await, Err(ChanError::Canceled)));
        assert!(matches!(rx.recv().await, Err(ChanError::Canceled)));
    }

    #[tokio::test]
    async fn send_deadline_immediate_is_a_non_blocking_probe() {
        let (tx, _rx) = channel::<i32>(0);
        let result = tx.send_deadline(1, Deadline::Immediate).await;
        assert!(matches!(result, Err(ChanError::TimedOut)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_senders_and_receivers_deliver_every_item_exactly_once() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 50;

        let (tx, rx) = channel::<usize>(8);
        let mut senders = Vec::new();
        for p in 0..PRODUCERS {
            let tx = tx.clone();
            senders.push(tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    tx.send(p * PER_PRODUCER + i).await.unwrap();
                }
            }));
        }
        drop(tx);

        let mut received = Vec::new();
        while let Ok(v) = rx.recv().await {
            received.push(v);
        }
        for s in senders {
            s.await.unwrap();
        }

        received.sort_unstable();
        let expected: Vec<usize> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn send_deadline_with_no_timeout_blocks_until_delivered() {
        let (tx, rx) = channel::<i32>(0);
        let deadline = Deadline::after(Duration::from_secs(5));
        let receiver = tokio::spawn(async move { rx.recv().await });
        tx.send_deadline(3, deadline).await.unwrap();
        assert_eq!(receiver.await.unwrap().unwrap(), 3);
    }
}

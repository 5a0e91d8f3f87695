//! The delivery queue — an unbounded FIFO buffer between producers and the
//! broadcaster, with a drain barrier for shutdown.
//!
//! The queue tracks depth as *queued + in-dispatch*: [`QueueTx::push`]
//! increments, [`QueueRx::task_done`] decrements after the broadcaster has
//! finished fanning the item out. [`QueueTx::join`] therefore resolves only
//! once every accepted envelope has been fully dispatched, not merely
//! dequeued — the property shutdown relies on.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parley_core::Envelope;
use tokio::sync::Notify;
use tokio::sync::mpsc;

/// Shared depth gauge between the two queue halves.
#[derive(Debug)]
struct Depth {
    pending: AtomicUsize,
    drained: Notify,
}

/// Create a new delivery queue, returning the producer and consumer halves.
pub fn delivery_queue() -> (QueueTx, QueueRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(Depth {
        pending: AtomicUsize::new(0),
        drained: Notify::new(),
    });
    (
        QueueTx {
            tx,
            depth: depth.clone(),
        },
        QueueRx { rx, depth },
    )
}

/// Producer half of the delivery queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct QueueTx {
    tx: mpsc::UnboundedSender<Envelope>,
    depth: Arc<Depth>,
}

impl QueueTx {
    /// Append an envelope to the queue tail.
    ///
    /// Never blocks or suspends. Returns `false` if the consumer half has
    /// been dropped.
    pub fn push(&self, envelope: Envelope) -> bool {
        let _ = self.depth.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(envelope).is_err() {
            if self.depth.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.depth.drained.notify_waiters();
            }
            return false;
        }
        true
    }

    /// Number of envelopes accepted but not yet fully dispatched.
    pub fn pending(&self) -> usize {
        self.depth.pending.load(Ordering::SeqCst)
    }

    /// Wait until every accepted envelope has been fully dispatched.
    ///
    /// Resolves immediately if the queue is already empty. Callers must
    /// ensure no new pushes race the drain (the ingestion sink stops
    /// accepting before shutdown calls this).
    pub async fn join(&self) {
        loop {
            // Register for the wakeup before re-checking the gauge, so a
            // concurrent `task_done` between the check and the await is
            // never missed.
            let mut drained = std::pin::pin!(self.depth.drained.notified());
            let _ = drained.as_mut().enable();
            if self.depth.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Consumer half of the delivery queue. There is exactly one.
#[derive(Debug)]
pub struct QueueRx {
    rx: mpsc::UnboundedReceiver<Envelope>,
    depth: Arc<Depth>,
}

impl QueueRx {
    /// Dequeue the next envelope, suspending while the queue is empty.
    ///
    /// Returns `None` once all producer handles are dropped and the queue
    /// is exhausted.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Mark the most recently dequeued envelope as fully dispatched.
    pub fn task_done(&self) {
        if self.depth.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.depth.drained.notify_waiters();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ConversationEvent, ConversationEventKind, ConversationId};
    use std::time::Duration;

    fn make_envelope() -> Envelope {
        Envelope::new(ConversationEvent::new(
            ConversationId::new(),
            ConversationEventKind::MessageCreated,
            serde_json::json!({}),
        ))
    }

    #[tokio::test]
    async fn push_then_recv_preserves_order() {
        let (tx, mut rx) = delivery_queue();
        let first = make_envelope();
        let second = make_envelope();
        assert!(tx.push(first.clone()));
        assert!(tx.push(second.clone()));

        assert_eq!(rx.recv().await.unwrap().event.id, first.event.id);
        assert_eq!(rx.recv().await.unwrap().event.id, second.event.id);
    }

    #[tokio::test]
    async fn pending_counts_queued_items() {
        let (tx, mut rx) = delivery_queue();
        assert_eq!(tx.pending(), 0);
        let _ = tx.push(make_envelope());
        let _ = tx.push(make_envelope());
        assert_eq!(tx.pending(), 2);

        let _ = rx.recv().await.unwrap();
        // Dequeued but not yet dispatched — still pending.
        assert_eq!(tx.pending(), 2);
        rx.task_done();
        assert_eq!(tx.pending(), 1);
    }

    #[tokio::test]
    async fn join_resolves_immediately_when_empty() {
        let (tx, _rx) = delivery_queue();
        tokio::time::timeout(Duration::from_millis(100), tx.join())
            .await
            .expect("join on empty queue should not wait");
    }

    #[tokio::test]
    async fn join_waits_for_task_done() {
        let (tx, mut rx) = delivery_queue();
        let _ = tx.push(make_envelope());
        let _ = rx.recv().await.unwrap();

        // Item dequeued but not done — join must still wait.
        let waited = tokio::time::timeout(Duration::from_millis(50), tx.join()).await;
        assert!(waited.is_err());

        let join_tx = tx.clone();
        let join_handle = tokio::spawn(async move { join_tx.join().await });
        rx.task_done();
        tokio::time::timeout(Duration::from_secs(1), join_handle)
            .await
            .expect("join should resolve after task_done")
            .unwrap();
    }

    #[tokio::test]
    async fn join_waits_for_every_item() {
        let (tx, mut rx) = delivery_queue();
        for _ in 0..10 {
            let _ = tx.push(make_envelope());
        }

        let join_tx = tx.clone();
        let join_handle = tokio::spawn(async move { join_tx.join().await });

        for _ in 0..10 {
            let _ = rx.recv().await.unwrap();
            rx.task_done();
        }
        tokio::time::timeout(Duration::from_secs(1), join_handle)
            .await
            .expect("join should resolve after all items dispatched")
            .unwrap();
        assert_eq!(tx.pending(), 0);
    }

    #[tokio::test]
    async fn push_after_consumer_dropped_returns_false() {
        let (tx, rx) = delivery_queue();
        drop(rx);
        assert!(!tx.push(make_envelope()));
        // A failed push must not leak pending depth.
        assert_eq!(tx.pending(), 0);
    }

    #[tokio::test]
    async fn recv_returns_none_after_producers_dropped() {
        let (tx, mut rx) = delivery_queue();
        let _ = tx.push(make_envelope());
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_suspends_while_empty() {
        let (tx, mut rx) = delivery_queue();
        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());
        let _ = tx.push(make_envelope());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn cloned_producers_share_depth() {
        let (tx, mut rx) = delivery_queue();
        let tx2 = tx.clone();
        let _ = tx.push(make_envelope());
        let _ = tx2.push(make_envelope());
        assert_eq!(tx.pending(), 2);
        assert_eq!(tx2.pending(), 2);

        let _ = rx.recv().await.unwrap();
        rx.task_done();
        let _ = rx.recv().await.unwrap();
        rx.task_done();
        assert_eq!(tx.pending(), 0);
    }
}

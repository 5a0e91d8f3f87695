//! The broadcaster — sole consumer of the delivery queue.
//!
//! For each envelope the broadcaster locks the registry for the whole
//! dispatch, fans out concurrently to the assistant forwarder and to every
//! subscriber of the event's conversation, joins all branches, and moves
//! on. Each branch catches and logs its own failure; a failing branch never
//! cancels its siblings. The loop itself survives every fault — it is the
//! only consumer, so it may exit only by deliberate cancellation (after the
//! queue has drained) or when the queue closes.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use metrics::counter;
use parley_core::Envelope;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::forwarder::AssistantForwarder;
use crate::queue::QueueRx;
use crate::registry::SubscriberRegistry;

/// Fans envelopes out to their audiences, one at a time, in queue order.
pub struct Broadcaster {
    queue: QueueRx,
    registry: Arc<SubscriberRegistry>,
    forwarder: Arc<dyn AssistantForwarder>,
    cancel: CancellationToken,
}

impl Broadcaster {
    /// Create a broadcaster over the consumer half of the delivery queue.
    pub fn new(
        queue: QueueRx,
        registry: Arc<SubscriberRegistry>,
        forwarder: Arc<dyn AssistantForwarder>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            registry,
            forwarder,
            cancel,
        }
    }

    /// Run the broadcast loop until cancelled or the queue closes.
    pub async fn run(mut self) {
        info!("broadcaster started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("broadcaster cancelled");
                    break;
                }
                maybe = self.queue.recv() => {
                    let Some(envelope) = maybe else {
                        info!("delivery queue closed, broadcaster exiting");
                        break;
                    };
                    let span = info_span!(
                        "dispatch",
                        correlation_id = %envelope.event.correlation_id,
                        conversation_id = %envelope.event.conversation_id,
                        kind = %envelope.event.kind,
                        event_id = %envelope.event.id,
                    );
                    // The broadcaster is the sole queue consumer: a
                    // panicking dispatch must not kill the loop.
                    let outcome = AssertUnwindSafe(self.dispatch(&envelope))
                        .catch_unwind()
                        .instrument(span)
                        .await;
                    if let Err(panic) = outcome {
                        counter!("broadcast_faults_total").increment(1);
                        error!(fault = panic_message(&*panic), "dispatch fault, continuing");
                    }
                    self.queue.task_done();
                }
            }
        }
    }

    /// Dispatch one envelope to its audiences.
    ///
    /// The registry lock is held for the full dispatch, so a join or leave
    /// serializes against the fan-out: a subscriber is either included in
    /// this event or excluded, never partially delivered.
    async fn dispatch(&self, envelope: &Envelope) {
        let event = &envelope.event;
        let audience = envelope.audience;
        let channels = self.registry.lock().await;

        let mut branches: Vec<JoinHandle<()>> = Vec::new();

        if audience.assistant {
            let forwarder = Arc::clone(&self.forwarder);
            let event = event.clone();
            branches.push(tokio::spawn(
                async move {
                    match forwarder.forward(&event).await {
                        Ok(()) => debug!("forwarded event to assistants"),
                        Err(error) => {
                            counter!("fanout_failures_total", "branch" => "assistant")
                                .increment(1);
                            warn!(%error, "assistant fan-out failed");
                        }
                    }
                }
                .in_current_span(),
            ));
        }

        if audience.user {
            if let Some(subscribers) = channels.get(&event.conversation_id) {
                for (subscriber_id, tx) in subscribers {
                    let subscriber_id = subscriber_id.clone();
                    let tx = tx.clone();
                    let event = event.clone();
                    branches.push(tokio::spawn(
                        async move {
                            if tx.send(event).is_ok() {
                                debug!(subscriber_id = %subscriber_id, "queued event for subscriber");
                            } else {
                                counter!("fanout_failures_total", "branch" => "subscriber")
                                    .increment(1);
                                warn!(
                                    subscriber_id = %subscriber_id,
                                    "subscriber channel closed, delivery dropped"
                                );
                            }
                        }
                        .in_current_span(),
                    ));
                }
            }
        }

        let recipients = branches.len();
        for result in join_all(branches).await {
            if let Err(error) = result {
                counter!("fanout_failures_total", "branch" => "panicked").increment(1);
                warn!(%error, "fan-out branch panicked");
            }
        }
        counter!("events_dispatched_total").increment(1);
        debug!(recipients, "event dispatched");
        drop(channels);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::ForwardError;
    use crate::queue::{QueueTx, delivery_queue};
    use async_trait::async_trait;
    use parley_core::{
        Audience, ConversationEvent, ConversationEventKind, ConversationId,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Forwarder double that records forwarded event ids.
    #[derive(Default)]
    struct RecordingForwarder {
        calls: AtomicUsize,
        fail: bool,
        tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<ConversationEvent>>>,
    }

    impl RecordingForwarder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn with_channel() -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let forwarder = Self {
                tx: parking_lot::Mutex::new(Some(tx)),
                ..Self::default()
            };
            (forwarder, rx)
        }
    }

    #[async_trait]
    impl AssistantForwarder for RecordingForwarder {
        async fn forward(&self, event: &ConversationEvent) -> Result<(), ForwardError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = self.tx.lock().as_ref() {
                let _ = tx.send(event.clone());
            }
            if self.fail {
                return Err(ForwardError::Unreachable("no services".into()));
            }
            Ok(())
        }
    }

    struct PanickingForwarder;

    #[async_trait]
    impl AssistantForwarder for PanickingForwarder {
        async fn forward(&self, _event: &ConversationEvent) -> Result<(), ForwardError> {
            panic!("forwarder exploded");
        }
    }

    fn make_envelope(conversation_id: &ConversationId, audience: Audience) -> Envelope {
        Envelope::with_audience(
            ConversationEvent::new(
                conversation_id.clone(),
                ConversationEventKind::MessageCreated,
                serde_json::json!({"text": "hi"}),
            ),
            audience,
        )
    }

    struct Fixture {
        tx: QueueTx,
        registry: Arc<SubscriberRegistry>,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    }

    fn boot(forwarder: Arc<dyn AssistantForwarder>) -> Fixture {
        let (tx, rx) = delivery_queue();
        let registry = Arc::new(SubscriberRegistry::new());
        let cancel = CancellationToken::new();
        let broadcaster = Broadcaster::new(rx, registry.clone(), forwarder, cancel.clone());
        let handle = tokio::spawn(broadcaster.run());
        Fixture {
            tx,
            registry,
            cancel,
            handle,
        }
    }

    #[tokio::test]
    async fn delivers_to_all_subscribers_of_conversation() {
        let fixture = boot(Arc::new(RecordingForwarder::default()));
        let conv = ConversationId::new();
        let mut a = fixture.registry.register(conv.clone()).await;
        let mut b = fixture.registry.register(conv.clone()).await;
        let mut other = fixture.registry.register(ConversationId::new()).await;

        let envelope = make_envelope(&conv, Audience::USERS);
        assert!(fixture.tx.push(envelope.clone()));

        let got_a = tokio::time::timeout(Duration::from_secs(1), a.rx.recv())
            .await
            .unwrap()
            .unwrap();
        let got_b = tokio::time::timeout(Duration::from_secs(1), b.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got_a.id, envelope.event.id);
        assert_eq!(got_b.id, envelope.event.id);
        assert_eq!(got_a.payload, got_b.payload);

        // The other conversation's subscriber saw nothing.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), other.rx.recv())
                .await
                .is_err()
        );

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn assistant_audience_reaches_forwarder_only() {
        let (forwarder, mut forwarded) = RecordingForwarder::with_channel();
        let fixture = boot(Arc::new(forwarder));
        let conv = ConversationId::new();
        let mut sub = fixture.registry.register(conv.clone()).await;

        let envelope = make_envelope(&conv, Audience::ASSISTANTS);
        assert!(fixture.tx.push(envelope.clone()));

        let got = tokio::time::timeout(Duration::from_secs(1), forwarded.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, envelope.event.id);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), sub.rx.recv())
                .await
                .is_err()
        );

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn user_audience_skips_forwarder() {
        let (forwarder, mut forwarded) = RecordingForwarder::with_channel();
        let fixture = boot(Arc::new(forwarder));
        let conv = ConversationId::new();
        let mut sub = fixture.registry.register(conv.clone()).await;

        assert!(fixture.tx.push(make_envelope(&conv, Audience::USERS)));

        assert!(
            tokio::time::timeout(Duration::from_secs(1), sub.rx.recv())
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(50), forwarded.recv())
                .await
                .is_err()
        );

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn forwarder_failure_does_not_block_subscribers() {
        let fixture = boot(Arc::new(RecordingForwarder::failing()));
        let conv = ConversationId::new();
        let mut sub = fixture.registry.register(conv.clone()).await;

        let envelope = make_envelope(&conv, Audience::ALL);
        assert!(fixture.tx.push(envelope.clone()));

        let got = tokio::time::timeout(Duration::from_secs(1), sub.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, envelope.event.id);

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn forwarder_panic_does_not_kill_loop_or_siblings() {
        let fixture = boot(Arc::new(PanickingForwarder));
        let conv = ConversationId::new();
        let mut sub = fixture.registry.register(conv.clone()).await;

        // Both events still reach the subscriber despite the panicking branch.
        assert!(fixture.tx.push(make_envelope(&conv, Audience::ALL)));
        assert!(fixture.tx.push(make_envelope(&conv, Audience::ALL)));

        for _ in 0..2 {
            assert!(
                tokio::time::timeout(Duration::from_secs(1), sub.rx.recv())
                    .await
                    .unwrap()
                    .is_some()
            );
        }

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn zero_subscribers_discards_without_error() {
        let fixture = boot(Arc::new(RecordingForwarder::default()));
        let conv = ConversationId::new();

        assert!(fixture.tx.push(make_envelope(&conv, Audience::USERS)));

        // The envelope is fully processed: the queue drains to zero.
        tokio::time::timeout(Duration::from_secs(1), fixture.tx.join())
            .await
            .expect("queue should drain with no subscribers");

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn subscriber_ordering_matches_submission() {
        let fixture = boot(Arc::new(RecordingForwarder::default()));
        let conv = ConversationId::new();
        let mut sub = fixture.registry.register(conv.clone()).await;

        let envelopes: Vec<Envelope> = (0..20)
            .map(|_| make_envelope(&conv, Audience::USERS))
            .collect();
        for envelope in &envelopes {
            assert!(fixture.tx.push(envelope.clone()));
        }

        for expected in &envelopes {
            let got = tokio::time::timeout(Duration::from_secs(1), sub.rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got.id, expected.event.id);
        }

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn closed_subscriber_channel_does_not_affect_others() {
        let fixture = boot(Arc::new(RecordingForwarder::default()));
        let conv = ConversationId::new();
        let dead = fixture.registry.register(conv.clone()).await;
        let mut live = fixture.registry.register(conv.clone()).await;
        drop(dead.rx); // receiver gone, sender still registered

        let envelope = make_envelope(&conv, Audience::USERS);
        assert!(fixture.tx.push(envelope.clone()));

        let got = tokio::time::timeout(Duration::from_secs(1), live.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, envelope.event.id);

        fixture.cancel.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn run_exits_when_queue_closes() {
        let fixture = boot(Arc::new(RecordingForwarder::default()));
        drop(fixture.tx);
        tokio::time::timeout(Duration::from_secs(1), fixture.handle)
            .await
            .expect("broadcaster should exit when queue closes")
            .unwrap();
    }

    #[tokio::test]
    async fn run_exits_on_cancel() {
        let fixture = boot(Arc::new(RecordingForwarder::default()));
        fixture.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), fixture.handle)
            .await
            .expect("broadcaster should exit on cancel")
            .unwrap();
    }

    #[test]
    fn panic_message_extracts_str() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "opaque panic payload");
    }
}

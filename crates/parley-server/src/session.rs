//! Streaming session lifecycle — one per connected client.
//!
//! A session drains its private channel with a bounded wait so it can
//! re-check three termination predicates even while idle: the global stop
//! signal, external removal from the registry, and client disconnection.
//! Deregistration is guaranteed on every exit path, including the transport
//! dropping the session mid-await, via [`DeregisterGuard`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use parley_core::{ConversationEvent, ConversationId, SubscriberId};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{SubscriberRegistration, SubscriberRegistry};

/// Why a streaming session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The global stop signal was observed.
    Stopped,
    /// The subscriber was removed from the registry externally.
    Removed,
    /// The client disconnected (reported by the probe or channel closure).
    Disconnected,
}

/// Asks the transport whether the client has gone away.
///
/// Probe errors are transient: the session logs them and continues as if
/// the client were still connected.
#[async_trait]
pub trait DisconnectProbe: Send {
    /// `Ok(true)` once the client is known to be gone.
    async fn is_disconnected(&mut self) -> anyhow::Result<bool>;
}

/// Probe for transports that signal disconnection by dropping the response
/// stream instead of answering a query — always reports connected.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttachedTransport;

#[async_trait]
impl DisconnectProbe for AttachedTransport {
    async fn is_disconnected(&mut self) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// One wire record emitted to a streaming client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRecord {
    /// Event ID.
    pub id: String,
    /// Event kind label (e.g. `message.created`).
    pub event: String,
    /// Serialized `{timestamp, payload}` body.
    pub data: String,
    /// Suggested client retry interval for reconnection, in milliseconds.
    pub retry_ms: u64,
}

impl StreamRecord {
    /// Build the wire record for one event.
    pub fn from_event(event: &ConversationEvent, retry_ms: u64) -> Self {
        Self {
            id: event.id.to_string(),
            event: event.kind.as_str().to_owned(),
            data: event.stream_body().to_string(),
            retry_ms,
        }
    }
}

/// Deregisters the subscriber when dropped, whatever the exit path.
#[derive(Debug)]
struct DeregisterGuard {
    registry: Arc<SubscriberRegistry>,
    conversation_id: ConversationId,
    subscriber_id: SubscriberId,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        gauge!("stream_sessions_active").decrement(1.0);
        let registry = Arc::clone(&self.registry);
        let conversation_id = self.conversation_id.clone();
        let subscriber_id = self.subscriber_id.clone();
        // The registry lock is async, so cleanup runs as a task. Outside a
        // runtime there is nothing to clean — the registry dies with the
        // process.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let _ = handle.spawn(async move {
                let _ = registry.unregister(&conversation_id, &subscriber_id).await;
            });
        }
    }
}

/// A live streaming session for one subscriber of one conversation.
pub struct StreamingSession {
    conversation_id: ConversationId,
    subscriber_id: SubscriberId,
    rx: mpsc::UnboundedReceiver<ConversationEvent>,
    registry: Arc<SubscriberRegistry>,
    stop: CancellationToken,
    poll_interval: Duration,
    retry_ms: u64,
    probe: Box<dyn DisconnectProbe>,
    end: Option<SessionEnd>,
    _guard: DeregisterGuard,
}

impl StreamingSession {
    /// Wrap a registration into a session.
    pub fn new(
        registration: SubscriberRegistration,
        registry: Arc<SubscriberRegistry>,
        stop: CancellationToken,
        poll_interval: Duration,
        retry_ms: u64,
        probe: Box<dyn DisconnectProbe>,
    ) -> Self {
        gauge!("stream_sessions_active").increment(1.0);
        info!(
            conversation_id = %registration.conversation_id,
            subscriber_id = %registration.subscriber_id,
            "client connected to event stream"
        );
        let guard = DeregisterGuard {
            registry: Arc::clone(&registry),
            conversation_id: registration.conversation_id.clone(),
            subscriber_id: registration.subscriber_id.clone(),
        };
        Self {
            conversation_id: registration.conversation_id,
            subscriber_id: registration.subscriber_id,
            rx: registration.rx,
            registry,
            stop,
            poll_interval,
            retry_ms,
            probe,
            end: None,
            _guard: guard,
        }
    }

    /// Conversation this session streams.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// This session's subscriber ID.
    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    /// Why the session ended, once [`next_record`](Self::next_record) has
    /// returned `None`.
    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.end
    }

    /// Produce the next wire record, or `None` once the session is over.
    ///
    /// Waits on the private channel in bounded slices of the poll interval,
    /// re-checking the termination predicates between waits.
    pub async fn next_record(&mut self) -> Option<StreamRecord> {
        loop {
            if self.stop.is_cancelled() {
                info!(conversation_id = %self.conversation_id, "stream stopping due to stop signal");
                return self.finish(SessionEnd::Stopped);
            }

            if !self
                .registry
                .contains(&self.conversation_id, &self.subscriber_id)
                .await
            {
                info!(conversation_id = %self.conversation_id, "stream stopping due to conversation ending");
                return self.finish(SessionEnd::Removed);
            }

            match self.probe.is_disconnected().await {
                Ok(true) => {
                    info!(conversation_id = %self.conversation_id, "client disconnected from stream");
                    return self.finish(SessionEnd::Disconnected);
                }
                Ok(false) => {}
                // Probe trouble is not a disconnect: keep serving.
                Err(error) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        %error,
                        "disconnect probe failed"
                    );
                }
            }

            match timeout(self.poll_interval, self.rx.recv()).await {
                Ok(Some(event)) => {
                    debug!(
                        conversation_id = %self.conversation_id,
                        subscriber_id = %self.subscriber_id,
                        event_id = %event.id,
                        kind = %event.kind,
                        "sending event to stream client"
                    );
                    counter!("stream_records_total").increment(1);
                    return Some(StreamRecord::from_event(&event, self.retry_ms));
                }
                // Channel closed: our sender left the registry.
                Ok(None) => {
                    info!(conversation_id = %self.conversation_id, "stream stopping due to conversation ending");
                    return self.finish(SessionEnd::Removed);
                }
                // Bounded wait elapsed — go re-check the predicates.
                Err(_elapsed) => {}
            }
        }
    }

    fn finish(&mut self, end: SessionEnd) -> Option<StreamRecord> {
        self.end = Some(end);
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! The event hub — process-scoped context for the distribution core.
//!
//! The hub owns everything the components share: the delivery queue, the
//! subscriber registry, the shutdown coordinator, the background task
//! handles, and the collaborator handles. It is created by [`EventHub::start`]
//! and torn down by [`EventHub::stop`]; nothing is process-global.

use std::sync::Arc;

use parking_lot::Mutex;
use parley_core::ConversationId;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::config::HubConfig;
use crate::forwarder::AssistantForwarder;
use crate::presence::{PresenceExpiry, run_presence_sweep};
use crate::queue::{QueueTx, delivery_queue};
use crate::registry::SubscriberRegistry;
use crate::session::{AttachedTransport, DisconnectProbe, StreamingSession};
use crate::shutdown::ShutdownCoordinator;
use crate::sink::EventSink;

/// Collaborator handles, held until shutdown completes.
struct Collaborators {
    _forwarder: Arc<dyn AssistantForwarder>,
    _presence: Arc<dyn PresenceExpiry>,
}

/// Process-scoped context object for the distribution core.
pub struct EventHub {
    config: HubConfig,
    sink: EventSink,
    registry: Arc<SubscriberRegistry>,
    shutdown: ShutdownCoordinator,
    queue: QueueTx,
    handles: Mutex<Vec<JoinHandle<()>>>,
    collaborators: Mutex<Option<Collaborators>>,
}

impl EventHub {
    /// Start the distribution core: spawns the broadcaster and the presence
    /// sweep. Must be called from within a Tokio runtime.
    pub fn start(
        config: HubConfig,
        forwarder: Arc<dyn AssistantForwarder>,
        presence: Arc<dyn PresenceExpiry>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = delivery_queue();
        let registry = Arc::new(SubscriberRegistry::new());
        let shutdown = ShutdownCoordinator::new();
        let sink = EventSink::new(queue_tx.clone(), shutdown.stop_token());

        let broadcaster = Broadcaster::new(
            queue_rx,
            Arc::clone(&registry),
            Arc::clone(&forwarder),
            shutdown.task_token(),
        );
        let broadcast_handle = tokio::spawn(broadcaster.run());
        let sweep_handle = tokio::spawn(run_presence_sweep(
            Arc::clone(&presence),
            config.presence_sweep_interval(),
            shutdown.task_token(),
        ));

        info!("event hub started");
        Arc::new(Self {
            config,
            sink,
            registry,
            shutdown,
            queue: queue_tx,
            handles: Mutex::new(vec![broadcast_handle, sweep_handle]),
            collaborators: Mutex::new(Some(Collaborators {
                _forwarder: forwarder,
                _presence: presence,
            })),
        })
    }

    /// Producer handle for submitting envelopes.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// The subscriber registry.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Whether shutdown has been initiated.
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_stopping()
    }

    /// Register a subscriber and open a streaming session over it, using
    /// the default probe (transports that disconnect by dropping the
    /// stream).
    pub async fn open_stream(&self, conversation_id: ConversationId) -> StreamingSession {
        self.open_stream_with_probe(conversation_id, Box::new(AttachedTransport))
            .await
    }

    /// Register a subscriber and open a streaming session with an explicit
    /// disconnect probe.
    pub async fn open_stream_with_probe(
        &self,
        conversation_id: ConversationId,
        probe: Box<dyn DisconnectProbe>,
    ) -> StreamingSession {
        let registration = self.registry.register(conversation_id).await;
        StreamingSession::new(
            registration,
            Arc::clone(&self.registry),
            self.shutdown.stop_token(),
            self.config.session_poll_interval(),
            self.config.client_retry_ms,
            probe,
        )
    }

    /// Remove every subscriber of a conversation; their sessions observe
    /// the removal on their next poll. Returns how many were removed.
    pub async fn end_conversation(&self, conversation_id: &ConversationId) -> usize {
        self.registry.remove_conversation(conversation_id).await
    }

    /// Stop the hub: reject new work, drain accepted envelopes, cancel and
    /// await background tasks, then release collaborator handles.
    pub async fn stop(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        self.shutdown
            .graceful(&self.queue, handles, self.config.shutdown_grace())
            .await;
        let released = self.collaborators.lock().take();
        drop(released);
        debug!("collaborator handles released");
        info!("event hub stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! The ingestion sink — the producer-facing edge of the distribution core.
//!
//! Producers treat delivery as fire-and-forget: `submit` never blocks,
//! never suspends, and never surfaces a delivery outcome as an error. Once
//! the stop signal is set, submissions are dropped with a log line only.

use metrics::counter;
use parley_core::Envelope;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::QueueTx;

/// Cloneable handle producers use to submit envelopes.
#[derive(Clone, Debug)]
pub struct EventSink {
    queue: QueueTx,
    stop: CancellationToken,
}

impl EventSink {
    pub(crate) fn new(queue: QueueTx, stop: CancellationToken) -> Self {
        Self { queue, stop }
    }

    /// Submit an envelope for delivery.
    ///
    /// Returns `true` if the envelope was accepted. After the stop signal
    /// is set the envelope is dropped silently (logged, not surfaced) and
    /// `false` is returned — producers are not expected to check.
    pub fn submit(&self, envelope: Envelope) -> bool {
        if self.stop.is_cancelled() {
            counter!("events_rejected_total").increment(1);
            warn!(
                conversation_id = %envelope.event.conversation_id,
                kind = %envelope.event.kind,
                event_id = %envelope.event.id,
                "ignoring event submitted after stop signal"
            );
            return false;
        }

        if !self.queue.push(envelope) {
            counter!("events_rejected_total").increment(1);
            warn!("delivery queue consumer gone, dropping event");
            return false;
        }

        counter!("events_submitted_total").increment(1);
        debug!("conversation event enqueued");
        true
    }

    /// Whether submissions are currently accepted.
    pub fn is_accepting(&self) -> bool {
        !self.stop.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

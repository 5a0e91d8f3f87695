//! Graceful shutdown coordination.
//!
//! Two `CancellationToken`s with distinct meanings: the *stop* token makes
//! the ingestion sink reject new work and tells streaming sessions to wind
//! down; the *task* token cancels the broadcaster and the presence sweep —
//! and is fired only after the delivery queue has fully drained, so no
//! accepted envelope is ever lost.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::QueueTx;

/// Coordinates the ordered shutdown of the distribution core.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    stop: CancellationToken,
    tasks: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            stop: CancellationToken::new(),
            tasks: CancellationToken::new(),
        }
    }

    /// Token observed by the ingestion sink and streaming sessions.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Token that cancels the broadcaster and periodic background tasks.
    pub fn task_token(&self) -> CancellationToken {
        self.tasks.clone()
    }

    /// Whether a shutdown has been initiated.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Run the ordered shutdown sequence.
    ///
    /// 1. Set the stop signal — the sink starts rejecting, sessions wind down.
    /// 2. Wait (unbounded) for the delivery queue to drain; every accepted
    ///    envelope finishes its fan-out.
    /// 3. Cancel the broadcaster and periodic tasks.
    /// 4. Await their termination for up to `grace`, suppressing
    ///    cancellation-induced errors.
    ///
    /// Shared resources may be released only after this returns.
    pub async fn graceful(&self, queue: &QueueTx, handles: Vec<JoinHandle<()>>, grace: Duration) {
        self.stop.cancel();
        info!(
            pending = queue.pending(),
            "stop signaled, draining delivery queue"
        );
        queue.join().await;
        info!("delivery queue drained");

        self.tasks.cancel();
        info!(
            task_count = handles.len(),
            grace_secs = grace.as_secs(),
            "waiting for background tasks"
        );
        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(()) => {}
                        // Cancellation is the expected way down.
                        Err(error) if error.is_cancelled() => {}
                        Err(error) => {
                            warn!(%error, "background task failed during shutdown");
                        }
                    }
                }
                info!("background tasks stopped");
            }
            Err(_elapsed) => {
                warn!("shutdown grace expired, some tasks may still be running");
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

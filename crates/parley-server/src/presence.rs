//! Periodic assistant-service presence sweep.
//!
//! An independent fixed-interval loop that asks a collaborator to expire
//! stale presence records. Failures are logged and the loop continues; it
//! exits only on cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Expires assistant-service presence records that have gone stale.
#[async_trait]
pub trait PresenceExpiry: Send + Sync {
    /// Run one expiry pass. Transport and policy are the collaborator's.
    async fn expire_stale(&self) -> anyhow::Result<()>;
}

/// Run the presence sweep until cancelled.
pub async fn run_presence_sweep(
    expiry: Arc<dyn PresenceExpiry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = tick.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("presence sweep cancelled");
                return;
            }
            _ = tick.tick() => {
                if let Err(error) = expiry.expire_stale().await {
                    warn!(%error, "presence sweep failed");
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

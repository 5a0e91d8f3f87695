//! Hub configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the event distribution hub.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Bounded wait per streaming-session poll, in milliseconds. Sessions
    /// re-check their termination predicates at this cadence even when idle.
    pub session_poll_interval_ms: u64,
    /// Reconnection interval suggested to streaming clients, in milliseconds.
    pub client_retry_ms: u64,
    /// Interval between presence-expiry sweeps, in seconds.
    pub presence_sweep_interval_secs: u64,
    /// How long to wait for cancelled background tasks at shutdown, in
    /// seconds, before giving up with a warning. The queue drain that
    /// precedes cancellation is not bounded by this.
    pub shutdown_grace_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            session_poll_interval_ms: 1_000,
            client_retry_ms: 1_000,
            presence_sweep_interval_secs: 10,
            shutdown_grace_secs: 30,
        }
    }
}

impl HubConfig {
    /// Session poll interval as a [`Duration`].
    pub fn session_poll_interval(&self) -> Duration {
        Duration::from_millis(self.session_poll_interval_ms)
    }

    /// Presence sweep interval as a [`Duration`].
    pub fn presence_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.presence_sweep_interval_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

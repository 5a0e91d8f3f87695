//! The assistant forwarder seam.
//!
//! Delivery to assistant services is a collaborator concern: the forwarder
//! owns its own transport, retry, and timeout policy. The broadcaster
//! invokes it as one fan-out branch and treats any error as isolated to
//! that branch.

use async_trait::async_trait;
use parley_core::ConversationEvent;
use thiserror::Error;

/// Errors surfaced by an assistant forwarder.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No assistant service could be reached.
    #[error("assistant service unreachable: {0}")]
    Unreachable(String),

    /// An assistant service refused the event.
    #[error("assistant service rejected event: {0}")]
    Rejected(String),

    /// Any other forwarder-internal failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Delivers an event to every assistant service participating in its
/// conversation.
#[async_trait]
pub trait AssistantForwarder: Send + Sync {
    /// Forward one event. Called once per dispatched envelope whose
    /// audience includes assistants; joined like any other fan-out branch.
    async fn forward(&self, event: &ConversationEvent) -> Result<(), ForwardError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_display() {
        let err = ForwardError::Unreachable("connection refused".into());
        assert_eq!(
            err.to_string(),
            "assistant service unreachable: connection refused"
        );
    }

    #[test]
    fn rejected_display() {
        let err = ForwardError::Rejected("unknown conversation".into());
        assert_eq!(
            err.to_string(),
            "assistant service rejected event: unknown conversation"
        );
    }

    #[test]
    fn other_wraps_anyhow() {
        let err = ForwardError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
    }
}

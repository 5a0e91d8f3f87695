//! The conversation event catalog and the [`ConversationEvent`] struct.
//!
//! Events are a flat struct with identity fields at the top level and a
//! `payload` stored as opaque [`serde_json::Value`]. The payload shape is
//! owned by the producing controller; the distribution core never inspects
//! it, only serializes it back out to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::ids::{ConversationId, CorrelationId, EventId};

/// All conversation event kinds.
///
/// Each variant serializes to a dot-separated string — the `event` field of
/// the streaming wire record — so clients can switch on a stable label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationEventKind {
    // -- Messages --
    /// A message was posted to the conversation.
    #[serde(rename = "message.created")]
    MessageCreated,
    /// A message was deleted from the conversation.
    #[serde(rename = "message.deleted")]
    MessageDeleted,

    // -- Participants --
    /// A participant joined the conversation.
    #[serde(rename = "participant.created")]
    ParticipantCreated,
    /// A participant's status or metadata changed.
    #[serde(rename = "participant.updated")]
    ParticipantUpdated,
    /// A participant left or was removed.
    #[serde(rename = "participant.deleted")]
    ParticipantDeleted,

    // -- Conversation lifecycle --
    /// Conversation title or metadata changed.
    #[serde(rename = "conversation.updated")]
    ConversationUpdated,
    /// The conversation was deleted.
    #[serde(rename = "conversation.deleted")]
    ConversationDeleted,

    // -- Files --
    /// A file was attached to the conversation.
    #[serde(rename = "file.created")]
    FileCreated,
    /// A new version of an attached file was uploaded.
    #[serde(rename = "file.updated")]
    FileUpdated,
    /// An attached file was removed.
    #[serde(rename = "file.deleted")]
    FileDeleted,

    // -- Assistant state --
    /// An assistant updated its conversation-scoped state.
    #[serde(rename = "assistant.state_updated")]
    AssistantStateUpdated,
}

/// All event kind variants, for exhaustive testing.
pub const ALL_EVENT_KINDS: [ConversationEventKind; 11] = [
    ConversationEventKind::MessageCreated,
    ConversationEventKind::MessageDeleted,
    ConversationEventKind::ParticipantCreated,
    ConversationEventKind::ParticipantUpdated,
    ConversationEventKind::ParticipantDeleted,
    ConversationEventKind::ConversationUpdated,
    ConversationEventKind::ConversationDeleted,
    ConversationEventKind::FileCreated,
    ConversationEventKind::FileUpdated,
    ConversationEventKind::FileDeleted,
    ConversationEventKind::AssistantStateUpdated,
];

impl ConversationEventKind {
    /// The dot-separated wire label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageCreated => "message.created",
            Self::MessageDeleted => "message.deleted",
            Self::ParticipantCreated => "participant.created",
            Self::ParticipantUpdated => "participant.updated",
            Self::ParticipantDeleted => "participant.deleted",
            Self::ConversationUpdated => "conversation.updated",
            Self::ConversationDeleted => "conversation.deleted",
            Self::FileCreated => "file.created",
            Self::FileUpdated => "file.updated",
            Self::FileDeleted => "file.deleted",
            Self::AssistantStateUpdated => "assistant.state_updated",
        }
    }
}

impl fmt::Display for ConversationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event kind label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for ConversationEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_EVENT_KINDS
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

/// A single conversation event, immutable once created.
///
/// The distribution core treats the payload as opaque; only `id`, `kind`,
/// `conversation_id`, and `correlation_id` drive routing and logging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    /// Unique event ID (UUID v7, time-ordered).
    pub id: EventId,
    /// Conversation this event belongs to.
    pub conversation_id: ConversationId,
    /// Correlation ID from the originating request.
    pub correlation_id: CorrelationId,
    /// Event kind discriminator.
    pub kind: ConversationEventKind,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Event-specific data (opaque JSON).
    pub payload: Value,
}

impl ConversationEvent {
    /// Create a new event with a fresh ID, timestamp, and correlation ID.
    pub fn new(
        conversation_id: ConversationId,
        kind: ConversationEventKind,
        payload: Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            conversation_id,
            correlation_id: CorrelationId::new(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Replace the auto-generated correlation ID with the caller's.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// The `{timestamp, payload}` JSON body streamed to subscribers.
    pub fn stream_body(&self) -> Value {
        serde_json::json!({
            "timestamp": self.timestamp,
            "payload": self.payload,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

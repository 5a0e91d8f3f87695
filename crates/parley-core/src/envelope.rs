//! The [`Envelope`] — an event paired with its intended audience.
//!
//! The envelope is the unit that producers submit and the broadcaster
//! dequeues. Audience selects which fan-out branches run: assistant
//! services, connected user clients, or both.

use serde::{Deserialize, Serialize};

use crate::events::ConversationEvent;

/// Recipient classes for an event — a subset of {assistant, user}.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Audience {
    /// Deliver to assistant services in the conversation.
    pub assistant: bool,
    /// Deliver to connected user clients streaming the conversation.
    pub user: bool,
}

impl Audience {
    /// Both assistant services and user clients.
    pub const ALL: Self = Self {
        assistant: true,
        user: true,
    };

    /// Assistant services only.
    pub const ASSISTANTS: Self = Self {
        assistant: true,
        user: false,
    };

    /// User clients only.
    pub const USERS: Self = Self {
        assistant: false,
        user: true,
    };

    /// Whether no recipient class is selected.
    pub fn is_empty(self) -> bool {
        !self.assistant && !self.user
    }
}

impl Default for Audience {
    /// Events reach both audiences unless the producer narrows the set.
    fn default() -> Self {
        Self::ALL
    }
}

/// An event paired with its audience — the queued unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The event to deliver.
    pub event: ConversationEvent,
    /// Which recipient classes receive it.
    #[serde(default)]
    pub audience: Audience,
}

impl Envelope {
    /// Wrap an event for delivery to both audiences.
    pub fn new(event: ConversationEvent) -> Self {
        Self {
            event,
            audience: Audience::ALL,
        }
    }

    /// Wrap an event for delivery to the given audience.
    pub fn with_audience(event: ConversationEvent, audience: Audience) -> Self {
        Self { event, audience }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

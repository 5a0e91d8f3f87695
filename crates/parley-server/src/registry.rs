//! The subscriber registry — conversation → subscriber → channel.
//!
//! All mutation and all enumeration happen under one exclusive async lock.
//! The broadcaster holds the lock for the full duration of a dispatch, so a
//! subscriber joining mid-broadcast is either fully included in an event or
//! fully excluded, never partially. The lock is a `tokio::sync::Mutex`
//! because it is held across await points inside a dispatch.

use std::collections::HashMap;

use parley_core::{ConversationEvent, ConversationId, SubscriberId};
use tokio::sync::mpsc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// The locked map: conversation → subscriber → sender half of the
/// subscriber's private channel.
pub(crate) type Channels =
    HashMap<ConversationId, HashMap<SubscriberId, mpsc::UnboundedSender<ConversationEvent>>>;

/// Handed to a streaming session on registration.
#[derive(Debug)]
pub struct SubscriberRegistration {
    /// Conversation the subscriber is attached to.
    pub conversation_id: ConversationId,
    /// Identifier unique within the conversation.
    pub subscriber_id: SubscriberId,
    /// Receiving half of the subscriber's private channel. The sending half
    /// lives in the registry and is dropped on deregistration.
    pub rx: mpsc::UnboundedReceiver<ConversationEvent>,
}

/// Concurrency-safe mapping of conversations to live subscriber channels.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    channels: Mutex<Channels>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for a conversation.
    pub async fn register(&self, conversation_id: ConversationId) -> SubscriberRegistration {
        let subscriber_id = SubscriberId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut channels = self.channels.lock().await;
            let _ = channels
                .entry(conversation_id.clone())
                .or_default()
                .insert(subscriber_id.clone(), tx);
        }
        debug!(
            conversation_id = %conversation_id,
            subscriber_id = %subscriber_id,
            "subscriber registered"
        );
        SubscriberRegistration {
            conversation_id,
            subscriber_id,
            rx,
        }
    }

    /// Remove a subscriber. The conversation's entry is removed entirely
    /// once its subscriber set becomes empty.
    ///
    /// Returns `true` if the subscriber was present. Idempotent.
    pub async fn unregister(
        &self,
        conversation_id: &ConversationId,
        subscriber_id: &SubscriberId,
    ) -> bool {
        let mut channels = self.channels.lock().await;
        let Some(subscribers) = channels.get_mut(conversation_id) else {
            return false;
        };
        let removed = subscribers.remove(subscriber_id).is_some();
        if subscribers.is_empty() {
            let _ = channels.remove(conversation_id);
        }
        if removed {
            debug!(
                conversation_id = %conversation_id,
                subscriber_id = %subscriber_id,
                "subscriber removed"
            );
        }
        removed
    }

    /// Remove every subscriber of a conversation (e.g. the conversation was
    /// deleted). Their sessions observe the removal on the next poll.
    ///
    /// Returns the number of subscribers removed.
    pub async fn remove_conversation(&self, conversation_id: &ConversationId) -> usize {
        let mut channels = self.channels.lock().await;
        channels
            .remove(conversation_id)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Whether the subscriber is still registered.
    pub async fn contains(
        &self,
        conversation_id: &ConversationId,
        subscriber_id: &SubscriberId,
    ) -> bool {
        let channels = self.channels.lock().await;
        channels
            .get(conversation_id)
            .is_some_and(|subscribers| subscribers.contains_key(subscriber_id))
    }

    /// Total number of live subscribers across all conversations.
    pub async fn subscriber_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels.values().map(HashMap::len).sum()
    }

    /// Number of conversations with at least one live subscriber.
    pub async fn conversation_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels.len()
    }

    /// Acquire the registry lock for the duration of one dispatch.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

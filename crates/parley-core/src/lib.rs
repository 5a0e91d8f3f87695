//! # parley-core
//!
//! Foundation types for the Parley realtime distribution core.
//!
//! This crate provides the shared vocabulary the server crate depends on:
//!
//! - **Branded IDs**: `ConversationId`, `EventId`, `SubscriberId`,
//!   `CorrelationId` as newtypes for type safety (UUID v7, time-ordered)
//! - **Event catalog**: `ConversationEventKind` with dot-separated wire
//!   labels, and the immutable `ConversationEvent` struct
//! - **Envelope**: `Envelope` + `Audience` — an event paired with the
//!   recipient classes it targets, the unit producers submit

#![deny(unsafe_code)]

pub mod envelope;
pub mod events;
pub mod ids;

pub use envelope::{Audience, Envelope};
pub use events::{ConversationEvent, ConversationEventKind};
pub use ids::{ConversationId, CorrelationId, EventId, SubscriberId};

//! # parley-server
//!
//! The realtime event-distribution core of the Parley conversation service.
//!
//! Domain mutations (messages posted, participants changed, files changed,
//! state updated) are submitted as envelopes and fanned out, in order, to
//! two independent audiences:
//!
//! - **Assistant services**, through the [`forwarder::AssistantForwarder`]
//!   collaborator
//! - **Connected clients**, through per-conversation SSE streams
//!
//! Delivery is best-effort, in-memory, at-most-once: a disconnected
//! subscriber permanently misses events raised during the gap.
//!
//! Structure:
//!
//! - [`hub::EventHub`] — process-scoped context: owns the queue, registry,
//!   tokens, and background tasks; explicit `start`/`stop` lifecycle
//! - [`sink::EventSink`] — fire-and-forget producer handle
//! - [`queue`] — unbounded delivery queue with a drain barrier
//! - [`broadcast::Broadcaster`] — sole consumer; ordered, lock-scoped,
//!   failure-isolated fan-out
//! - [`registry::SubscriberRegistry`] — conversation → subscriber channels
//!   under one lock
//! - [`session::StreamingSession`] — per-client poll loop with guaranteed
//!   deregistration
//! - [`shutdown::ShutdownCoordinator`] — stop → drain → cancel → await →
//!   release
//! - [`server`] — Axum router: `/health` and the SSE streaming endpoint

#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod forwarder;
pub mod health;
pub mod hub;
pub mod logging;
pub mod presence;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod sink;

pub use config::HubConfig;
pub use forwarder::{AssistantForwarder, ForwardError};
pub use hub::EventHub;
pub use presence::PresenceExpiry;
pub use session::{DisconnectProbe, SessionEnd, StreamRecord, StreamingSession};
pub use sink::EventSink;

//! Axum surface for the distribution core.
//!
//! Two routes: `GET /health` and the per-conversation streaming endpoint
//! `GET /conversations/{conversation_id}/events`, which serves
//! `text/event-stream` records until the session ends. Everything else —
//! domain CRUD, auth, principals — belongs to the embedding service.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use futures::Stream;
use parley_core::ConversationId;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::health::{self, HealthResponse};
use crate::hub::EventHub;
use crate::session::StreamRecord;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The distribution core.
    pub hub: Arc<EventHub>,
    /// When the server started.
    pub start_time: Instant,
}

/// Build the router for the distribution core's endpoints.
pub fn router(hub: Arc<EventHub>) -> Router {
    let state = AppState {
        hub,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/conversations/{conversation_id}/events",
            get(stream_conversation_events),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let conversations = state.hub.registry().conversation_count().await;
    let subscribers = state.hub.registry().subscriber_count().await;
    Json(health::health_check(
        state.start_time,
        conversations,
        subscribers,
    ))
}

/// GET /conversations/{conversation_id}/events — long-lived SSE stream.
///
/// Disconnection is observed through the response stream being dropped,
/// which deregisters the subscriber; there is no resumption token, so a
/// reconnecting client misses events raised during the gap.
async fn stream_conversation_events(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let conversation_id = ConversationId::from_string(conversation_id);
    let mut session = state.hub.open_stream(conversation_id).await;

    let stream = async_stream::stream! {
        while let Some(record) = session.next_record().await {
            yield Ok(record_to_sse(&record));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Map a wire record onto an SSE event.
fn record_to_sse(record: &StreamRecord) -> Event {
    Event::default()
        .id(&record.id)
        .event(&record.event)
        .data(&record.data)
        .retry(Duration::from_millis(record.retry_ms))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

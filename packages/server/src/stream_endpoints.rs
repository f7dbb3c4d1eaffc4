//! Node Change Stream
//!
//! - `GET /api/nodes/:id/stream` - Server-Sent Events for one node
//!
//! Events are named after their kind with a JSON payload:
//!
//! ```text
//! event: update
//! data: {"content":"Hel","streaming":true}
//!
//! event: complete
//! data: {"content":"Hello","streaming":false}
//! ```
//!
//! `complete`, `error` and `timeout` end the stream. Closing the connection
//! stops polling.

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::time::Duration;

use crate::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe to changes of one node
///
/// # Example
///
/// ```bash
/// curl -N http://localhost:3001/api/nodes/<node-id>/stream
/// ```
async fn stream_node(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    tracing::debug!("📡 SSE subscription for node {}", id);

    let events = state.notifier.subscribe(id).map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.payload().to_string()),
        )
    });

    (
        [("x-accel-buffering", "no")],
        Sse::new(events).keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keepalive"),
        ),
    )
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/nodes/:id/stream", get(stream_node))
        .with_state(state)
}

//! Chat Endpoint
//!
//! - `POST /api/chat` - Continue a conversation from a node
//!
//! The response body is the assistant's reply as plain text, streamed as the
//! provider produces it. Node ids travel in headers because the body starts
//! streaming before anything else could be said about the turn:
//!
//! - `X-Node-Id`: the new ASSISTANT node
//! - `X-User-Node-Id`: the new USER node (absent with `skipUserNode`)
//!
//! The stored node is written in the background while the body streams. If the
//! provider fails mid-stream the body ends with an error and the connection is
//! aborted.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{Json, Response},
    routing::post,
    Router,
};

use crate::{AppState, HttpError};
use arbor_core::services::ChatRequest;

pub const NODE_ID_HEADER: &str = "x-node-id";
pub const USER_NODE_ID_HEADER: &str = "x-user-node-id";

/// Continue a conversation
///
/// # Example
///
/// ```bash
/// curl -N -X POST http://localhost:3001/api/chat \
///   -H "Content-Type: application/json" \
///   -d '{
///     "projectId": "<project-id>",
///     "parentNodeId": "<node-id>",
///     "message": "Explain that again, shorter",
///     "provider": "echo"
///   }'
/// ```
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(request) = payload?;
    let turn = state.conversations.continue_conversation(request).await?;

    tracing::debug!(
        "💬 Streaming reply into node {} ({} context tokens)",
        turn.assistant_node.id,
        turn.context_tokens
    );

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .header(NODE_ID_HEADER, turn.assistant_node.id.as_str());
    if let Some(user_node) = &turn.user_node {
        response = response.header(USER_NODE_ID_HEADER, user_node.id.as_str());
    }

    response
        .body(Body::from_stream(turn.session))
        .map_err(|e| HttpError::internal("Failed to build chat response", e.to_string()))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}

//! Node Endpoints
//!
//! # Endpoints
//!
//! - `POST /api/nodes` - Create a node
//! - `GET /api/nodes/:id` - Get a node by ID
//! - `PATCH /api/nodes/:id/content` - Replace content, merge metadata
//! - `DELETE /api/nodes/:id` - Delete a node and its subtree
//! - `POST /api/nodes/:id/fork` - Create an alternative sibling
//! - `GET /api/nodes/:id/context` - Linear context the node would send to a provider

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;

use crate::{AppState, HttpError};
use arbor_core::models::{ContentUpdate, CreateNodeParams, Node};
use arbor_core::services::ConversationContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkRequest {
    #[serde(default)]
    pub content: Option<String>,
}

/// Create a new node
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3001/api/nodes \
///   -H "Content-Type: application/json" \
///   -d '{
///     "projectId": "<project-id>",
///     "parentId": null,
///     "role": "SYSTEM",
///     "content": "You are a helpful assistant.",
///     "positionX": 0,
///     "positionY": 0
///   }'
/// ```
async fn create_node(
    State(state): State<AppState>,
    payload: Result<Json<CreateNodeParams>, JsonRejection>,
) -> Result<(StatusCode, Json<Node>), HttpError> {
    let Json(params) = payload?;
    let node = state.nodes.create_node(params).await?;

    tracing::debug!("✅ Created node: {}", node.id);
    Ok((StatusCode::CREATED, Json(node)))
}

/// Get a node by ID
///
/// # Example
///
/// ```bash
/// curl http://localhost:3001/api/nodes/<node-id>
/// ```
async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Node>, HttpError> {
    Ok(Json(state.nodes.get_node(&id).await?))
}

/// Replace a node's content
///
/// Metadata keys in the body are merged into the stored metadata.
///
/// # Example
///
/// ```bash
/// curl -X PATCH http://localhost:3001/api/nodes/<node-id>/content \
///   -H "Content-Type: application/json" \
///   -d '{"content": "Edited question", "metadata": {"label": "v2"}}'
/// ```
async fn update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ContentUpdate>, JsonRejection>,
) -> Result<Json<Node>, HttpError> {
    let Json(update) = payload?;
    Ok(Json(state.nodes.update_node_content(&id, update).await?))
}

async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.nodes.delete_node(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fork a node into a sibling branch
///
/// The body is optional; without `content` the fork copies the original's content.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3001/api/nodes/<node-id>/fork \
///   -H "Content-Type: application/json" \
///   -d '{"content": "What if we tried it the other way?"}'
/// ```
async fn fork_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<ForkRequest>>,
) -> Result<(StatusCode, Json<Node>), HttpError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let fork = state.nodes.fork_node(&id, request.content).await?;
    Ok((StatusCode::CREATED, Json(fork)))
}

async fn get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationContext>, HttpError> {
    Ok(Json(state.contexts.build_conversation_context(&id).await?))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/nodes", post(create_node))
        .route("/api/nodes/:id", get(get_node).delete(delete_node))
        .route("/api/nodes/:id/content", patch(update_content))
        .route("/api/nodes/:id/fork", post(fork_node))
        .route("/api/nodes/:id/context", get(get_context))
        .with_state(state)
}

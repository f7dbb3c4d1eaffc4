//! Conversation Tree Endpoint
//!
//! - `GET /api/conversations/tree?conversationId=<uuid>` - Nested forest of a project
//!
//! A conversation is addressed by its project id. The response carries the
//! roots with their descendants nested under `children`, plus a node count:
//!
//! ```json
//! {"conversationId": "...", "tree": [{"id": "...", "children": [...]}], "nodeCount": 3}
//! ```

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, HttpError};
use arbor_core::services::{ConversationTree, NodeServiceError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuery {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Get the nested conversation tree
///
/// # Errors
///
/// - 400 when `conversationId` is missing or not a UUID
/// - 404 when no such conversation exists
/// - 500 when the store fails
///
/// # Example
///
/// ```bash
/// curl "http://localhost:3001/api/conversations/tree?conversationId=<project-id>"
/// ```
async fn get_conversation_tree(
    State(state): State<AppState>,
    query: Result<Query<TreeQuery>, QueryRejection>,
) -> Result<Json<ConversationTree>, HttpError> {
    let Query(query) = query?;
    let conversation_id = query
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| HttpError::new("conversationId is required", "VALIDATION_ERROR"))?;

    if Uuid::parse_str(&conversation_id).is_err() {
        return Err(HttpError::with_details(
            "Invalid conversationId format",
            "INVALID_INPUT",
            format!("'{}' is not a UUID", conversation_id),
        ));
    }

    match state.nodes.get_conversation_tree(&conversation_id).await {
        Ok(tree) => Ok(Json(tree)),
        Err(NodeServiceError::ProjectNotFound { .. }) => Err(HttpError::new(
            "Conversation not found",
            "CONVERSATION_NOT_FOUND",
        )),
        Err(e) => {
            tracing::error!("❌ Tree retrieval failed for {}: {}", conversation_id, e);
            Err(HttpError::internal(
                "Failed to fetch conversation tree",
                e.to_string(),
            ))
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/conversations/tree", get(get_conversation_tree))
        .with_state(state)
}

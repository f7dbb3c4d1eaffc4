//! HTTP error handling
//!
//! Every failed request answers with a JSON body of the same shape:
//! `{"error": "...", "code": "...", "details": "..."}` where `details` is optional.

use arbor_core::services::{ChatError, NodeServiceError};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// JSON error response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// User-facing error message
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Optional diagnostic detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        code: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: Some(details.into()),
        }
    }

    /// Generic 500 that keeps the underlying cause in `details`
    pub fn internal(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with_details(error, "INTERNAL_ERROR", details)
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "NODE_NOT_FOUND" | "PROJECT_NOT_FOUND" | "CONVERSATION_NOT_FOUND" => {
                StatusCode::NOT_FOUND
            }
            "INVALID_INPUT" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<NodeServiceError> for HttpError {
    fn from(err: NodeServiceError) -> Self {
        match err {
            NodeServiceError::NodeNotFound { id } => {
                HttpError::new(format!("Node not found: {}", id), "NODE_NOT_FOUND")
            }
            NodeServiceError::ProjectNotFound { id } => {
                HttpError::new(format!("Project not found: {}", id), "PROJECT_NOT_FOUND")
            }
            NodeServiceError::ValidationFailed(e) => {
                HttpError::new(e.to_string(), "VALIDATION_ERROR")
            }
            NodeServiceError::InvalidParent { .. } => {
                HttpError::new(err.to_string(), "INVALID_INPUT")
            }
            NodeServiceError::DatabaseError(_) | NodeServiceError::SerializationError(_) => {
                tracing::error!("Storage failure: {}", err);
                HttpError::internal("Internal server error", err.to_string())
            }
        }
    }
}

impl From<ChatError> for HttpError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Service(e) => e.into(),
            ChatError::UnknownProvider(_) => HttpError::new(err.to_string(), "INVALID_INPUT"),
            ChatError::Generation(e) => {
                tracing::warn!("Provider failed to start: {}", e);
                HttpError::with_details("Generation provider failed", "UPSTREAM_ERROR", e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        HttpError::with_details("Invalid request body", "INVALID_INPUT", rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        HttpError::with_details("Invalid query string", "INVALID_INPUT", rejection.body_text())
    }
}

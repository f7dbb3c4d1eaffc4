//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
///
/// Provides high-level error types for all service operations,
/// with detailed context and proper error chaining.
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Project not found by ID
    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    /// Validation failed for node
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Parent exists but cannot own the node (e.g. lives in another project)
    #[error("Invalid parent node {parent_id}: {reason}")]
    InvalidParent { parent_id: String, reason: String },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl NodeServiceError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create a project not found error
    pub fn project_not_found(id: impl Into<String>) -> Self {
        Self::ProjectNotFound { id: id.into() }
    }

    /// Create an invalid parent error
    pub fn invalid_parent(parent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            parent_id: parent_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// True for the "thing does not exist" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::ProjectNotFound { .. }
        )
    }
}

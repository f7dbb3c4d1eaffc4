//! Node Data Structures
//!
//! This module defines the `Node` struct and related types for Arbor's branching
//! conversation forest.
//!
//! # Architecture
//!
//! - **Parent-pointer forest**: every node optionally points at its parent; a node with
//!   no parent is the root of its own tree inside a project
//! - **One turn per node**: `role` says who spoke, `content` is what was said
//! - **Typed metadata**: the recognized keys (`streaming`, `provider`, `model`, `isRoot`,
//!   `forkedFrom`) are fields of [`NodeMetadata`]; anything else lands in its open bag
//!
//! # Examples
//!
//! ```rust
//! use arbor_core::models::{CreateNodeParams, Node, NodeMetadata, NodeRole};
//!
//! let root = Node::from_params(CreateNodeParams {
//!     project_id: "project-1".to_string(),
//!     parent_id: None,
//!     role: NodeRole::User,
//!     content: "Hello".to_string(),
//!     position_x: 0.0,
//!     position_y: 0.0,
//!     metadata: NodeMetadata::default(),
//! });
//! assert!(root.is_root());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for Node operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid id format: {0}")]
    InvalidId(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    System,
    User,
    Assistant,
}

impl NodeRole {
    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::System => "SYSTEM",
            NodeRole::User => "USER",
            NodeRole::Assistant => "ASSISTANT",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYSTEM" => Ok(NodeRole::System),
            "USER" => Ok(NodeRole::User),
            "ASSISTANT" => Ok(NodeRole::Assistant),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}

/// Per-node side-channel data
///
/// Recognized keys are typed fields. Unknown keys are preserved verbatim in `extra`
/// so clients can attach their own data without a schema change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// True while an assistant response is still being generated into this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,

    /// Generation provider that produced the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model identifier used by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,

    /// Node this one was forked from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<String>,

    /// Any other keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeMetadata {
    /// Metadata for a freshly created assistant node awaiting generation
    pub fn streaming(provider: Option<String>, model: Option<String>) -> Self {
        Self {
            streaming: Some(true),
            provider,
            model,
            ..Self::default()
        }
    }

    /// Metadata update that only clears the streaming flag
    pub fn finished() -> Self {
        Self {
            streaming: Some(false),
            ..Self::default()
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.unwrap_or(false)
    }

    /// Merge `update` into `self`: every key present in `update` replaces ours,
    /// keys absent from `update` are left alone.
    pub fn merge(&mut self, update: NodeMetadata) {
        if update.streaming.is_some() {
            self.streaming = update.streaming;
        }
        if update.provider.is_some() {
            self.provider = update.provider;
        }
        if update.model.is_some() {
            self.model = update.model;
        }
        if update.is_root.is_some() {
            self.is_root = update.is_root;
        }
        if update.forked_from.is_some() {
            self.forked_from = update.forked_from;
        }
        self.extra.extend(update.extra);
    }
}

/// A single conversation turn positioned in a project's forest.
///
/// # Fields
///
/// - `id`: Unique identifier (UUID v4)
/// - `project_id`: Owning project
/// - `parent_id`: Parent turn; `None` means this node roots its own tree
/// - `role`: SYSTEM, USER or ASSISTANT
/// - `content`: Turn text (grows while an assistant response streams in)
/// - `position_x` / `position_y`: Canvas coordinates
/// - `metadata`: Typed side-channel data, see [`NodeMetadata`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub role: NodeRole,
    pub content: String,
    pub position_x: f64,
    pub position_y: f64,
    pub metadata: NodeMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build an unsaved node with a fresh UUID and current timestamps
    pub fn from_params(params: CreateNodeParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: params.project_id,
            parent_id: params.parent_id,
            role: params.role,
            content: params.content,
            position_x: params.position_x,
            position_y: params.position_y,
            metadata: params.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check role-dependent metadata rules
    ///
    /// Only ASSISTANT nodes may carry `streaming = true`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::MissingField("projectId".to_string()));
        }
        if self.metadata.is_streaming() && self.role != NodeRole::Assistant {
            return Err(ValidationError::InvalidMetadata(format!(
                "streaming=true is only valid on ASSISTANT nodes, got {}",
                self.role
            )));
        }
        Ok(())
    }
}

/// Input for node creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeParams {
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub role: NodeRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

/// Wholesale content replacement plus optional metadata merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<NodeMetadata>,
}

impl ContentUpdate {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: NodeMetadata) -> Self {
        Self {
            content: content.into(),
            metadata: Some(metadata),
        }
    }
}

/// New canvas coordinates for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub node_id: String,
    pub position_x: f64,
    pub position_y: f64,
}

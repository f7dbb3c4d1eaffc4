//! Project Data Structures
//!
//! A project is the namespace that owns one forest of conversation nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation forest and its descriptive data
///
/// `root_node_id` records the first root node ever created in the project. It is
/// advisory: a project may hold any number of roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub root_node_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Build an unsaved project with a fresh UUID
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            root_node_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for project creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectParams {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

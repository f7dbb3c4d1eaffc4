//! NodeStore Trait - Database Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts persistence of projects
//! and nodes. `NodeService` holds an `Arc<dyn NodeStore>`, so business rules never
//! touch SQL and tests can wrap or replace the backend.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: every method is async; reads and writes are the only suspension
//!    points of the core besides the token-stream source
//! 2. **Option for lookups**: a missing row is `Ok(None)`, not an error; the service layer
//!    decides whether absence is a failure
//! 3. **Atomic units**: `create_node` (insert + root claim) and `batch_update_positions`
//!    are each all-or-nothing
//!
//! # Examples
//!
//! ```rust,no_run
//! use arbor_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/arbor.db")).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!     let node = store.get_node("node-123").await?;
//!     Ok(())
//! }
//! ```

use crate::db::DatabaseError;
use crate::models::{Node, NodeMetadata, PositionUpdate, Project};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Abstraction layer for project and node persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a store is shared between request handlers,
/// background streaming writers and notifier poll loops.
#[async_trait]
pub trait NodeStore: Send + Sync {
    //
    // PROJECTS
    //

    /// Persist a new project and return it as stored
    async fn create_project(&self, project: Project) -> Result<Project, DatabaseError>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>, DatabaseError>;

    /// All projects, newest first
    async fn list_projects(&self) -> Result<Vec<Project>, DatabaseError>;

    /// Delete a project and (by cascade) every node in it
    ///
    /// Returns `false` when no such project existed.
    async fn delete_project(&self, id: &str) -> Result<bool, DatabaseError>;

    //
    // NODES
    //

    /// Persist a new node and return it as stored
    ///
    /// When `node.parent_id` is `None` and the project has no `root_node_id` yet,
    /// the project's `root_node_id` is set to this node in the same transaction.
    async fn create_node(&self, node: Node) -> Result<Node, DatabaseError>;

    async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError>;

    /// Replace content and metadata wholesale
    ///
    /// Returns `false` when the node does not exist.
    async fn update_node_content(
        &self,
        id: &str,
        content: &str,
        metadata: &NodeMetadata,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Apply all position updates as one transaction
    ///
    /// A missing node aborts the whole batch with `DatabaseError::MissingRow`.
    async fn batch_update_positions(
        &self,
        updates: &[PositionUpdate],
        updated_at: DateTime<Utc>,
    ) -> Result<usize, DatabaseError>;

    /// Every node of a project, in creation order
    async fn list_nodes_for_project(&self, project_id: &str) -> Result<Vec<Node>, DatabaseError>;

    /// Parentless nodes of a project, in creation order
    async fn list_root_nodes(&self, project_id: &str) -> Result<Vec<Node>, DatabaseError>;

    /// Delete a node and (by cascade) its whole subtree
    ///
    /// Returns `false` when no such node existed.
    async fn delete_node(&self, id: &str) -> Result<bool, DatabaseError>;
}

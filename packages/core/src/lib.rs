//! Arbor Core Business Logic Layer
//!
//! This crate provides the data management, conversation reconstruction, streaming
//! persistence and layout for Arbor, a branching AI conversation canvas.
//!
//! # Architecture
//!
//! - **Forest per project**: nodes point at their parent; any number of roots per project
//! - **libsql/Turso**: embedded SQLite-compatible database, cascading deletes
//! - **Two-tier streaming writes**: throttled best-effort writes plus one awaited final write
//! - **Polling change notifier**: behind a trait so a push channel can replace it
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, Project, metadata)
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Business services (NodeService, ContextBuilder, StreamingSynchronizer, ...)
//! - [`tree`] - Pure algorithms: nested tree building and auto-layout

pub mod db;
pub mod models;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use models::*;
pub use services::*;
pub use tree::{
    build_nested_tree, calculate_tree_layout, LayoutConfig, LayoutInput, LayoutPosition, NestedNode,
};

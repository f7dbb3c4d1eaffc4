//! Data Models
//!
//! This module contains the core data structures used throughout Arbor:
//!
//! - `Project` - Namespace owning one conversation forest
//! - `Node` - A single conversation turn with a parent pointer
//! - `NodeMetadata` - Typed side-channel keys plus an open bag
//!
//! Nodes are stored in the relational `nodes` table; metadata is serialized as JSON.

mod node;
mod project;

pub use node::{
    ContentUpdate, CreateNodeParams, Node, NodeMetadata, NodeRole, PositionUpdate,
    ValidationError,
};
pub use project::{CreateProjectParams, Project};

//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management (`DatabaseService`)
//! - The `NodeStore` abstraction the service layer depends on
//! - `TursoStore`, the libsql-backed `NodeStore`
//!
//! # Architecture
//!
//! SQL stays in `DatabaseService` (`db_*` methods returning raw rows). `TursoStore`
//! converts rows to models. `NodeService` only ever sees `Arc<dyn NodeStore>`.

mod database;
mod error;
mod node_store;
mod turso_store;

pub use database::{
    format_timestamp, DatabaseService, DbCreateNodeParams, DbCreateProjectParams,
    DbPositionParams, DbUpdateContentParams, NODE_COLUMNS, PROJECT_COLUMNS,
};
pub use error::DatabaseError;
pub use node_store::NodeStore;
pub use turso_store::TursoStore;

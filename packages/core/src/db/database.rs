//! Database Connection Management
//!
//! This module provides the database connection and initialization
//! functionality using libsql for Arbor's project/node schema.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging so pollers can read while a stream writes
//! - **Foreign keys**: Enabled on every connection; deletes remove subtrees leaf first in one transaction
//! - **JSON metadata**: Node metadata is stored as serialized JSON text
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** It applies the
//! per-connection pragmas (busy timeout, foreign keys) that SQLite does not persist.
//!
//! ```no_run
//! # use arbor_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/arbor.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use crate::tree::forest::Forest;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Column list shared by every node SELECT (order matters for row conversion)
pub const NODE_COLUMNS: &str = "id, project_id, parent_id, role, content, position_x, position_y, metadata, created_at, updated_at";

/// Column list shared by every project SELECT
pub const PROJECT_COLUMNS: &str = "id, name, description, root_node_id, created_at, updated_at";

/// Format a timestamp the way it is stored (RFC3339, millisecond precision)
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Database service for managing libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Parameters for project insertion
pub struct DbCreateProjectParams<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub created_at: &'a str,
}

/// Parameters for node insertion (avoids too-many-arguments lint)
pub struct DbCreateNodeParams<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub role: &'a str,
    pub content: &'a str,
    pub position_x: f64,
    pub position_y: f64,
    pub metadata: &'a str,
    pub created_at: &'a str,
}

/// Parameters for a content rewrite
pub struct DbUpdateContentParams<'a> {
    pub id: &'a str,
    pub content: &'a str,
    pub metadata: &'a str,
    pub updated_at: &'a str,
}

/// One row of a batch position update
pub struct DbPositionParams<'a> {
    pub id: &'a str,
    pub position_x: f64,
    pub position_y: f64,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        tracing::info!("Database ready at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: every statement is `IF NOT EXISTS`.
    ///
    /// # Schema
    ///
    /// - `projects`: one row per conversation forest
    /// - `nodes`: conversation turns, cascading on both project and parent deletion
    /// - Indexes: creation order per project, roots/children per project
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                -- First root ever created in the project (advisory, set once)
                root_node_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create projects table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                parent_id TEXT,
                role TEXT NOT NULL CHECK (role IN ('SYSTEM', 'USER', 'ASSISTANT')),
                content TEXT NOT NULL DEFAULT '',
                position_x REAL NOT NULL DEFAULT 0,
                position_y REAL NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                -- Project deletion cascades to its whole forest
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                -- A node owns its descendants
                FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create nodes table: {}", e))
        })?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_nodes_project_created ON nodes(project_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_nodes_project_parent ON nodes(project_id, parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
        ];
        for sql in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create index: {}", e))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection to the database
    ///
    /// **⚠️ WARNING**: the returned connection has no busy timeout and foreign keys
    /// disabled. Use `connect_with_timeout()` for anything that writes.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection configured for concurrent async use
    ///
    /// Sets a 5-second busy timeout so a streaming writer and concurrent pollers
    /// wait on each other instead of failing with `SQLITE_BUSY`, and enables
    /// foreign keys so cascading deletes fire.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    //
    // PROJECT OPERATIONS
    //

    /// Insert a project row
    pub async fn db_create_project(
        &self,
        params: DbCreateProjectParams<'_>,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT INTO projects (id, name, description, root_node_id, created_at, updated_at)
             VALUES (?, ?, ?, NULL, ?, ?)",
            (
                params.id,
                params.name,
                params.description,
                params.created_at,
                params.created_at,
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert project: {}", e)))?;

        Ok(())
    }

    /// Fetch a single project row by ID
    pub async fn db_get_project(&self, id: &str) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut rows = conn
            .query(
                &format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS),
                [id],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute get_project query: {}", e))
            })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// All projects, newest first
    pub async fn db_list_projects(&self) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.query(
            &format!(
                "SELECT {} FROM projects ORDER BY created_at DESC, rowid DESC",
                PROJECT_COLUMNS
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute list_projects query: {}", e))
        })
    }

    /// Delete a project and its whole forest
    ///
    /// Nodes are removed leaf first before the project row, in one transaction.
    /// Returns the number of project rows deleted (0 if the project is absent).
    pub async fn db_delete_project(&self, id: &str) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        Self::begin_immediate(&conn).await?;

        let result = async {
            let rows = conn
                .query(
                    "SELECT id, parent_id FROM nodes WHERE project_id = ?
                     ORDER BY created_at ASC, rowid ASC",
                    [id],
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to list nodes of project: {}", e))
                })?;
            let nodes = Self::read_parent_links(rows).await?;
            Self::delete_leaves_first(&conn, &nodes).await?;

            conn.execute("DELETE FROM projects WHERE id = ?", [id])
                .await
                .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete project: {}", e)))
        }
        .await;

        Self::finish_transaction(&conn, result).await
    }

    //
    // NODE OPERATIONS
    //

    /// Insert a node and, for parentless nodes, claim the project's `root_node_id`
    ///
    /// Both statements run in one transaction. The root claim only succeeds while
    /// `root_node_id IS NULL`, so the first root wins and later roots leave it alone.
    pub async fn db_create_node(&self, params: DbCreateNodeParams<'_>) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE TRANSACTION", ())
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
            })?;

        let insert = conn
            .execute(
                "INSERT INTO nodes (id, project_id, parent_id, role, content, position_x, position_y, metadata, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    params.id,
                    params.project_id,
                    params.parent_id,
                    params.role,
                    params.content,
                    params.position_x,
                    params.position_y,
                    params.metadata,
                    params.created_at,
                    params.created_at,
                ),
            )
            .await;

        if let Err(e) = insert {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to insert node {}: {}",
                params.id, e
            )));
        }

        if params.parent_id.is_none() {
            let claim = conn
                .execute(
                    "UPDATE projects SET root_node_id = ?, updated_at = ?
                     WHERE id = ? AND root_node_id IS NULL",
                    (params.id, params.created_at, params.project_id),
                )
                .await;

            if let Err(e) = claim {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to record root node for project {}: {}",
                    params.project_id, e
                )));
            }
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(())
    }

    /// Retrieve a single node row by ID
    ///
    /// * `Ok(Some(row))` - Node found
    /// * `Ok(None)` - Node not found
    pub async fn db_get_node(&self, id: &str) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut rows = conn
            .query(
                &format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS),
                [id],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
            })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Replace a node's content and metadata in one statement
    ///
    /// Returns the number of rows changed (0 means the node does not exist).
    pub async fn db_update_node_content(
        &self,
        params: DbUpdateContentParams<'_>,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "UPDATE nodes SET content = ?, metadata = ?, updated_at = ? WHERE id = ?",
            (params.content, params.metadata, params.updated_at, params.id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to update node {}: {}", params.id, e))
        })
    }

    /// Apply a set of position updates atomically
    ///
    /// Every row must exist; the first missing id rolls the whole batch back and is
    /// reported as `DatabaseError::MissingRow`.
    pub async fn db_batch_update_positions(
        &self,
        updates: &[DbPositionParams<'_>],
        updated_at: &str,
    ) -> Result<usize, DatabaseError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE TRANSACTION", ())
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
            })?;

        for params in updates {
            let result = conn
                .execute(
                    "UPDATE nodes SET position_x = ?, position_y = ?, updated_at = ? WHERE id = ?",
                    (params.position_x, params.position_y, updated_at, params.id),
                )
                .await;

            match result {
                Ok(0) => {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::missing_row(params.id));
                }
                Ok(_) => {}
                Err(e) => {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to update position of node {}: {}",
                        params.id, e
                    )));
                }
            }
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(updates.len())
    }

    /// All nodes of a project in creation order
    pub async fn db_list_nodes_for_project(
        &self,
        project_id: &str,
    ) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.query(
            &format!(
                "SELECT {} FROM nodes WHERE project_id = ? ORDER BY created_at ASC, rowid ASC",
                NODE_COLUMNS
            ),
            [project_id],
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute list_nodes query: {}", e))
        })
    }

    /// Parentless nodes of a project in creation order
    pub async fn db_list_root_nodes(&self, project_id: &str) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.query(
            &format!(
                "SELECT {} FROM nodes WHERE project_id = ? AND parent_id IS NULL
                 ORDER BY created_at ASC, rowid ASC",
                NODE_COLUMNS
            ),
            [project_id],
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute list_roots query: {}", e))
        })
    }

    /// Delete a node and its subtree
    ///
    /// Returns the number of nodes deleted (0 if the node is absent).
    pub async fn db_delete_node(&self, id: &str) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        Self::begin_immediate(&conn).await?;

        let result = async {
            // UNION (not UNION ALL) so a corrupted cycle still terminates
            let rows = conn
                .query(
                    "WITH RECURSIVE subtree(id) AS (
                         SELECT id FROM nodes WHERE id = ?
                         UNION
                         SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
                     )
                     SELECT n.id, n.parent_id FROM nodes n JOIN subtree s ON n.id = s.id",
                    [id],
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to collect subtree of {}: {}", id, e))
                })?;
            let nodes = Self::read_parent_links(rows).await?;
            Self::delete_leaves_first(&conn, &nodes).await
        }
        .await;

        Self::finish_transaction(&conn, result).await
    }

    //
    // TRANSACTION HELPERS
    //

    async fn begin_immediate(conn: &libsql::Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE TRANSACTION", ())
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e)))
    }

    /// Commit on success, roll back on any error
    async fn finish_transaction<T>(
        conn: &libsql::Connection,
        result: Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    )));
                }
                Ok(value)
            }
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn read_parent_links(
        mut rows: libsql::Rows,
    ) -> Result<Vec<(String, Option<String>)>, DatabaseError> {
        let mut links = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::row_conversion(format!("id: {}", e)))?;
            let parent_id: Option<String> = row
                .get(1)
                .map_err(|e| DatabaseError::row_conversion(format!("parent_id: {}", e)))?;
            links.push((id, parent_id));
        }
        Ok(links)
    }

    /// Delete nodes one row at a time, every descendant before its ancestor
    ///
    /// SQLite runs each `ON DELETE CASCADE` as a nested trigger program and caps the
    /// nesting at 1000 levels. Deleting leaf first leaves every cascade with nothing
    /// to do, so chains of any depth can be removed.
    async fn delete_leaves_first(
        conn: &libsql::Connection,
        nodes: &[(String, Option<String>)],
    ) -> Result<u64, DatabaseError> {
        let forest = Forest::build(
            nodes
                .iter()
                .map(|(id, parent_id)| (id.as_str(), parent_id.as_deref())),
        );

        let mut deleted = 0;
        for &member in forest.preorder.iter().rev() {
            let id = nodes[forest.members[member]].0.as_str();
            deleted += conn
                .execute("DELETE FROM nodes WHERE id = ?", [id])
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to delete node {}: {}", id, e))
                })?;
        }
        Ok(deleted)
    }
}

//! TursoStore - NodeStore Implementation for the libsql Backend
//!
//! This module implements the `NodeStore` trait on top of `DatabaseService`.
//!
//! # Design Principles
//!
//! 1. **Pure Delegation**: SQL lives in `DatabaseService`; this layer only converts
//! 2. **Row Conversion**: Handles libsql::Row → model conversion in one place
//! 3. **Read-after-create**: created rows are read back so callers see stored values
//!    (timestamps are truncated to milliseconds on the way in)

use crate::db::database::{
    format_timestamp, DbCreateNodeParams, DbCreateProjectParams, DbPositionParams,
    DbUpdateContentParams,
};
use crate::db::node_store::NodeStore;
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{Node, NodeMetadata, NodeRole, PositionUpdate, Project};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;
use std::sync::Arc;

/// TursoStore implements NodeStore for the libsql backend
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    /// Create a new TursoStore wrapper
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Parse timestamp from database - handles both RFC3339 and SQLite formats
    ///
    /// Arbor writes RFC3339: "YYYY-MM-DDTHH:MM:SS.mmmZ"
    /// Rows inserted by hand may use SQLite CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS"
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        Err(DatabaseError::row_conversion(format!(
            "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
            s
        )))
    }

    fn column_error(name: &'static str) -> impl FnOnce(libsql::Error) -> DatabaseError {
        move |e| DatabaseError::row_conversion(format!("Failed to get {}: {}", name, e))
    }

    /// Convert libsql::Row to Node
    ///
    /// # Row Format
    ///
    /// Columns as listed in `NODE_COLUMNS`:
    /// id, project_id, parent_id, role, content, position_x, position_y,
    /// metadata (JSON text), created_at, updated_at
    fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
        let id: String = row.get(0).map_err(Self::column_error("id"))?;
        let project_id: String = row.get(1).map_err(Self::column_error("project_id"))?;
        let parent_id: Option<String> = row.get(2).map_err(Self::column_error("parent_id"))?;
        let role_str: String = row.get(3).map_err(Self::column_error("role"))?;
        let content: String = row.get(4).map_err(Self::column_error("content"))?;
        let position_x: f64 = row.get(5).map_err(Self::column_error("position_x"))?;
        let position_y: f64 = row.get(6).map_err(Self::column_error("position_y"))?;
        let metadata_json: String = row.get(7).map_err(Self::column_error("metadata"))?;
        let created_at_str: String = row.get(8).map_err(Self::column_error("created_at"))?;
        let updated_at_str: String = row.get(9).map_err(Self::column_error("updated_at"))?;

        let role: NodeRole = role_str
            .parse()
            .map_err(|e| DatabaseError::row_conversion(format!("Node {}: {}", id, e)))?;

        let metadata: NodeMetadata = serde_json::from_str(&metadata_json).map_err(|e| {
            DatabaseError::row_conversion(format!("Failed to parse metadata of node {}: {}", id, e))
        })?;

        Ok(Node {
            project_id,
            parent_id,
            role,
            content,
            position_x,
            position_y,
            metadata,
            created_at: Self::parse_timestamp(&created_at_str)?,
            updated_at: Self::parse_timestamp(&updated_at_str)?,
            id,
        })
    }

    /// Convert libsql::Row to Project (columns as listed in `PROJECT_COLUMNS`)
    fn row_to_project(row: &Row) -> Result<Project, DatabaseError> {
        let created_at: String = row.get(4).map_err(Self::column_error("created_at"))?;
        let updated_at: String = row.get(5).map_err(Self::column_error("updated_at"))?;

        Ok(Project {
            id: row.get(0).map_err(Self::column_error("id"))?,
            name: row.get(1).map_err(Self::column_error("name"))?,
            description: row.get(2).map_err(Self::column_error("description"))?,
            root_node_id: row.get(3).map_err(Self::column_error("root_node_id"))?,
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }

    async fn collect_nodes(mut rows: libsql::Rows) -> Result<Vec<Node>, DatabaseError> {
        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    fn metadata_json(metadata: &NodeMetadata) -> Result<String, DatabaseError> {
        serde_json::to_string(metadata)
            .map_err(|e| DatabaseError::row_conversion(format!("Failed to serialize metadata: {}", e)))
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn create_project(&self, project: Project) -> Result<Project, DatabaseError> {
        let created_at = format_timestamp(&project.created_at);

        self.db
            .db_create_project(DbCreateProjectParams {
                id: &project.id,
                name: &project.name,
                description: project.description.as_deref(),
                created_at: &created_at,
            })
            .await?;

        self.get_project(&project.id)
            .await?
            .ok_or_else(|| DatabaseError::missing_row(&project.id))
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, DatabaseError> {
        match self.db.db_get_project(id).await? {
            Some(row) => Ok(Some(Self::row_to_project(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_projects(&self) -> Result<Vec<Project>, DatabaseError> {
        let mut rows = self.db.db_list_projects().await?;
        let mut projects = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            projects.push(Self::row_to_project(&row)?);
        }
        Ok(projects)
    }

    async fn delete_project(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.db.db_delete_project(id).await? > 0)
    }

    async fn create_node(&self, node: Node) -> Result<Node, DatabaseError> {
        let metadata = Self::metadata_json(&node.metadata)?;
        let created_at = format_timestamp(&node.created_at);

        self.db
            .db_create_node(DbCreateNodeParams {
                id: &node.id,
                project_id: &node.project_id,
                parent_id: node.parent_id.as_deref(),
                role: node.role.as_str(),
                content: &node.content,
                position_x: node.position_x,
                position_y: node.position_y,
                metadata: &metadata,
                created_at: &created_at,
            })
            .await?;

        self.get_node(&node.id)
            .await?
            .ok_or_else(|| DatabaseError::missing_row(&node.id))
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        match self.db.db_get_node(id).await? {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_node_content(
        &self,
        id: &str,
        content: &str,
        metadata: &NodeMetadata,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let metadata = Self::metadata_json(metadata)?;
        let updated_at = format_timestamp(&updated_at);

        let changed = self
            .db
            .db_update_node_content(DbUpdateContentParams {
                id,
                content,
                metadata: &metadata,
                updated_at: &updated_at,
            })
            .await?;

        Ok(changed > 0)
    }

    async fn batch_update_positions(
        &self,
        updates: &[PositionUpdate],
        updated_at: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let params: Vec<DbPositionParams<'_>> = updates
            .iter()
            .map(|update| DbPositionParams {
                id: &update.node_id,
                position_x: update.position_x,
                position_y: update.position_y,
            })
            .collect();

        self.db
            .db_batch_update_positions(&params, &format_timestamp(&updated_at))
            .await
    }

    async fn list_nodes_for_project(&self, project_id: &str) -> Result<Vec<Node>, DatabaseError> {
        let rows = self.db.db_list_nodes_for_project(project_id).await?;
        Self::collect_nodes(rows).await
    }

    async fn list_root_nodes(&self, project_id: &str) -> Result<Vec<Node>, DatabaseError> {
        let rows = self.db.db_list_root_nodes(project_id).await?;
        Self::collect_nodes(rows).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.db.db_delete_node(id).await? > 0)
    }
}

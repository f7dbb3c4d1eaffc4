//! Node Service - Forest CRUD and Business Rules
//!
//! `NodeService` is the only entry point the rest of Arbor uses to read or mutate
//! projects and nodes. It enforces the forest invariants on top of `NodeStore`:
//!
//! - a node's project must exist, and its parent (if any) must live in the same project
//! - `metadata.streaming = true` is only allowed on ASSISTANT nodes and, once cleared,
//!   can never be set again
//! - the first root created in a project becomes the project's `rootNodeId`
//!   (the store does this atomically with the insert)
//! - position batches are all-or-nothing
//!
//! Missing rows surface as `NodeServiceError::NodeNotFound` / `ProjectNotFound`.

use crate::db::{DatabaseError, NodeStore};
use crate::models::{
    ContentUpdate, CreateNodeParams, CreateProjectParams, Node, NodeMetadata, PositionUpdate,
    Project, ValidationError,
};
use crate::services::error::NodeServiceError;
use crate::tree::{build_nested_tree, calculate_tree_layout, LayoutConfig, LayoutInput, NestedNode};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Horizontal distance between a node and a fork created from it
const FORK_OFFSET_X: f64 = 300.0;

/// Nested view of a whole conversation forest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTree {
    pub conversation_id: String,
    pub tree: Vec<NestedNode>,
    pub node_count: usize,
}

/// Business-rule layer over a `NodeStore`
#[derive(Clone)]
pub struct NodeService {
    store: Arc<dyn NodeStore>,
}

impl NodeService {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Underlying store (for components that need raw access)
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    //
    // PROJECTS
    //

    pub async fn create_project(
        &self,
        params: CreateProjectParams,
    ) -> Result<Project, NodeServiceError> {
        let name = params.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name".to_string()).into());
        }

        let project = Project::new(name, params.description);
        let created = self.store.create_project(project).await?;
        tracing::info!("Created project {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project, NodeServiceError> {
        self.store
            .get_project(id)
            .await?
            .ok_or_else(|| NodeServiceError::project_not_found(id))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, NodeServiceError> {
        Ok(self.store.list_projects().await?)
    }

    /// Delete a project together with every node in it
    pub async fn delete_project(&self, id: &str) -> Result<(), NodeServiceError> {
        if !self.store.delete_project(id).await? {
            return Err(NodeServiceError::project_not_found(id));
        }
        tracing::info!("Deleted project {}", id);
        Ok(())
    }

    //
    // NODES
    //

    /// Create a node
    ///
    /// # Errors
    ///
    /// - `ProjectNotFound` if the project does not exist
    /// - `NodeNotFound` if `parent_id` names a node that does not exist
    /// - `InvalidParent` if the parent belongs to a different project
    /// - `ValidationFailed` if `streaming = true` is set on a non-ASSISTANT node
    pub async fn create_node(&self, params: CreateNodeParams) -> Result<Node, NodeServiceError> {
        let mut node = Node::from_params(params);
        node.validate()?;

        if self.store.get_project(&node.project_id).await?.is_none() {
            return Err(NodeServiceError::project_not_found(&node.project_id));
        }

        match node.parent_id.as_deref() {
            Some(parent_id) => {
                let parent = self
                    .store
                    .get_node(parent_id)
                    .await?
                    .ok_or_else(|| NodeServiceError::node_not_found(parent_id))?;

                if parent.project_id != node.project_id {
                    return Err(NodeServiceError::invalid_parent(
                        parent_id,
                        format!(
                            "parent belongs to project {}, node to project {}",
                            parent.project_id, node.project_id
                        ),
                    ));
                }
            }
            None => {
                node.metadata.is_root.get_or_insert(true);
            }
        }

        let created = self.store.create_node(node).await?;
        tracing::debug!(
            "Created {} node {} in project {} (parent: {:?})",
            created.role,
            created.id,
            created.project_id,
            created.parent_id
        );
        Ok(created)
    }

    pub async fn get_node(&self, id: &str) -> Result<Node, NodeServiceError> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(id))
    }

    /// Replace a node's content and merge the supplied metadata keys
    ///
    /// Content is replaced wholesale, never appended. Metadata keys present in the
    /// update overwrite stored ones; absent keys are kept.
    pub async fn update_node_content(
        &self,
        id: &str,
        update: ContentUpdate,
    ) -> Result<Node, NodeServiceError> {
        let existing = self.get_node(id).await?;

        let mut metadata = existing.metadata.clone();
        if let Some(patch) = update.metadata {
            if patch.streaming == Some(true) && !existing.metadata.is_streaming() {
                return Err(ValidationError::InvalidMetadata(format!(
                    "node {} is not streaming; streaming cannot be re-enabled",
                    id
                ))
                .into());
            }
            metadata.merge(patch);
        }

        let updated = Node {
            content: update.content,
            metadata,
            ..existing
        };
        updated.validate()?;

        let found = self
            .store
            .update_node_content(id, &updated.content, &updated.metadata, Utc::now())
            .await?;
        if !found {
            return Err(NodeServiceError::node_not_found(id));
        }

        self.get_node(id).await
    }

    /// Apply position updates as a single all-or-nothing unit
    ///
    /// Returns the number of nodes updated.
    pub async fn batch_update_positions(
        &self,
        updates: Vec<PositionUpdate>,
    ) -> Result<usize, NodeServiceError> {
        if let Some(bad) = updates
            .iter()
            .find(|u| !u.position_x.is_finite() || !u.position_y.is_finite())
        {
            return Err(ValidationError::InvalidMetadata(format!(
                "non-finite position for node {}",
                bad.node_id
            ))
            .into());
        }

        match self.store.batch_update_positions(&updates, Utc::now()).await {
            Ok(count) => Ok(count),
            Err(DatabaseError::MissingRow { id }) => Err(NodeServiceError::node_not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Every node of a project in creation order
    pub async fn list_nodes_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<Node>, NodeServiceError> {
        self.get_project(project_id).await?;
        Ok(self.store.list_nodes_for_project(project_id).await?)
    }

    /// Every parentless node of a project in creation order
    ///
    /// `Project::root_node_id` only remembers the first of these.
    pub async fn list_root_nodes(&self, project_id: &str) -> Result<Vec<Node>, NodeServiceError> {
        self.get_project(project_id).await?;
        Ok(self.store.list_root_nodes(project_id).await?)
    }

    /// Delete a node and its whole subtree
    pub async fn delete_node(&self, id: &str) -> Result<(), NodeServiceError> {
        if !self.store.delete_node(id).await? {
            return Err(NodeServiceError::node_not_found(id));
        }
        tracing::debug!("Deleted node {} and its descendants", id);
        Ok(())
    }

    /// Fork a node: create a sibling that shares its parent and role
    ///
    /// The original is untouched. The fork carries `content` if given, otherwise a
    /// copy of the original's content, and records `forkedFrom`. A streaming flag is
    /// never copied.
    pub async fn fork_node(
        &self,
        id: &str,
        content: Option<String>,
    ) -> Result<Node, NodeServiceError> {
        let source = self.get_node(id).await?;

        let metadata = NodeMetadata {
            streaming: None,
            is_root: None,
            forked_from: Some(source.id.clone()),
            ..source.metadata.clone()
        };

        let fork = self
            .create_node(CreateNodeParams {
                project_id: source.project_id.clone(),
                parent_id: source.parent_id.clone(),
                role: source.role,
                content: content.unwrap_or_else(|| source.content.clone()),
                position_x: source.position_x + FORK_OFFSET_X,
                position_y: source.position_y,
                metadata,
            })
            .await?;

        tracing::info!("Forked node {} into {}", source.id, fork.id);
        Ok(fork)
    }

    /// Recompute canvas positions for a whole project and persist them in one batch
    ///
    /// Returns the number of nodes updated (0 for an empty project).
    pub async fn apply_auto_layout(
        &self,
        project_id: &str,
        config: &LayoutConfig,
    ) -> Result<usize, NodeServiceError> {
        let nodes = self.list_nodes_for_project(project_id).await?;
        if nodes.is_empty() {
            return Ok(0);
        }

        let inputs: Vec<LayoutInput> = nodes.iter().map(LayoutInput::from).collect();
        let updates: Vec<PositionUpdate> = calculate_tree_layout(&inputs, config)
            .into_iter()
            .map(PositionUpdate::from)
            .collect();

        let count = self.batch_update_positions(updates).await?;
        tracing::info!("Auto-layout placed {} nodes in project {}", count, project_id);
        Ok(count)
    }

    /// Nested tree of a whole conversation (project)
    pub async fn get_conversation_tree(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationTree, NodeServiceError> {
        let nodes = self.list_nodes_for_project(conversation_id).await?;
        let node_count = nodes.len();

        Ok(ConversationTree {
            conversation_id: conversation_id.to_string(),
            tree: build_nested_tree(nodes),
            node_count,
        })
    }
}

#[cfg(test)]
#[path = "node_service_test.rs"]
mod node_service_test;

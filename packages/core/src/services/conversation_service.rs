//! Conversation Service - Continuing a Conversation at a Node
//!
//! Orchestrates one chat turn:
//!
//! 1. validate the request
//! 2. create the USER node under `parentNodeId` (unless `skipUserNode`)
//! 3. rebuild the thread with the `ContextBuilder`
//! 4. open the provider's token stream
//! 5. create the streaming ASSISTANT node and start the `StreamingSynchronizer`
//!
//! If the provider fails to start, the USER node stays; no ASSISTANT node is created.

use crate::models::{CreateNodeParams, Node, NodeMetadata, NodeRole, ValidationError};
use crate::services::context_builder::ContextBuilder;
use crate::services::generation::{GenerationError, GenerationRequest, ProviderRegistry};
use crate::services::streaming::{AssistantNodeParams, StreamingSession, StreamingSynchronizer};
use crate::services::{NodeService, NodeServiceError};
use serde::Deserialize;
use thiserror::Error;

/// Vertical distance between a turn and the reply placed under it
const TURN_SPACING_Y: f64 = 150.0;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Service(#[from] NodeServiceError),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl From<ValidationError> for ChatError {
    fn from(error: ValidationError) -> Self {
        Self::Service(error.into())
    }
}

/// Chat/continue request
///
/// Required fields are optional here so that a missing one is reported as a
/// field-specific validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_node_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    #[serde(default)]
    pub metadata: Option<NodeMetadata>,
    #[serde(default)]
    pub skip_user_node: bool,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ValidationError::MissingField(field.to_string()))
}

/// A started chat turn
pub struct ChatTurn {
    pub user_node: Option<Node>,
    pub assistant_node: Node,
    /// Estimated tokens sent to the provider
    pub context_tokens: usize,
    pub session: StreamingSession,
}

#[derive(Clone)]
pub struct ConversationService {
    nodes: NodeService,
    contexts: ContextBuilder,
    synchronizer: StreamingSynchronizer,
    providers: ProviderRegistry,
    context_budget: Option<usize>,
}

impl ConversationService {
    pub fn new(
        nodes: NodeService,
        contexts: ContextBuilder,
        synchronizer: StreamingSynchronizer,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            nodes,
            contexts,
            synchronizer,
            providers,
            context_budget: None,
        }
    }

    /// Trim contexts to roughly `max_tokens` before they reach the provider
    pub fn with_context_budget(mut self, max_tokens: usize) -> Self {
        self.context_budget = Some(max_tokens);
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub async fn continue_conversation(&self, request: ChatRequest) -> Result<ChatTurn, ChatError> {
        let project_id = required(&request.project_id, "projectId")?;
        let parent_node_id = required(&request.parent_node_id, "parentNodeId")?;
        let message = required(&request.message, "message")?;

        let provider = self
            .providers
            .resolve(request.provider.as_deref())
            .ok_or_else(|| ChatError::UnknownProvider(request.provider.clone().unwrap_or_default()))?;

        let parent = self.nodes.get_node(parent_node_id).await?;
        if parent.project_id != project_id {
            return Err(NodeServiceError::invalid_parent(
                parent_node_id,
                format!("node belongs to project {}", parent.project_id),
            )
            .into());
        }

        let user_x = request.position_x.unwrap_or(parent.position_x);
        let user_y = request
            .position_y
            .unwrap_or(parent.position_y + TURN_SPACING_Y);

        let user_node = if request.skip_user_node {
            None
        } else {
            Some(
                self.nodes
                    .create_node(CreateNodeParams {
                        project_id: project_id.to_string(),
                        parent_id: Some(parent.id.clone()),
                        role: NodeRole::User,
                        content: message.to_string(),
                        position_x: user_x,
                        position_y: user_y,
                        metadata: request.metadata.clone().unwrap_or_default(),
                    })
                    .await?,
            )
        };

        // The reply hangs off the new USER node, or off the parent when it already holds the turn
        let (anchor_id, anchor_x, anchor_y) = match &user_node {
            Some(user) => (user.id.clone(), user.position_x, user.position_y),
            None => (parent.id.clone(), parent.position_x, parent.position_y),
        };

        let mut context = self.contexts.build_conversation_context(&anchor_id).await?;
        if let Some(budget) = self.context_budget {
            context = context.within_budget(budget);
        }

        let model = request
            .model
            .clone()
            .or_else(|| provider.default_model().map(str::to_string));

        let source = provider
            .stream(GenerationRequest {
                messages: context.messages,
                model: model.clone(),
            })
            .await?;

        let assistant_node = self
            .synchronizer
            .create_assistant_node(AssistantNodeParams {
                project_id: project_id.to_string(),
                parent_id: Some(anchor_id),
                provider: Some(provider.name().to_string()),
                model,
                position_x: anchor_x,
                position_y: anchor_y + TURN_SPACING_Y,
            })
            .await?;

        tracing::info!(
            "Chat turn in project {}: assistant node {} via {} ({} context tokens)",
            project_id,
            assistant_node.id,
            provider.name(),
            context.total_tokens
        );

        let session = self.synchronizer.start(assistant_node.id.clone(), source);

        Ok(ChatTurn {
            user_node,
            assistant_node,
            context_tokens: context.total_tokens,
            session,
        })
    }
}

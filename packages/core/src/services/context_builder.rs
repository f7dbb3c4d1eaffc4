//! Context Builder - Linear Thread Reconstruction
//!
//! Rebuilds the conversation a generation provider should see when continuing at a
//! node: the chain of ancestors from the node's root down to the node itself.
//!
//! The climb is tolerant of bad data:
//!
//! - a parent id that no longer resolves (orphan) ends the climb; the orphan is the root
//! - a repeated id (cycle) ends the climb at the point of repetition
//!
//! Neither case is an error. Only a missing *target* node fails.

use crate::db::NodeStore;
use crate::models::{Node, NodeRole};
use crate::services::error::NodeServiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Fixed per-message overhead added to the character estimate
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Approximate token cost of one message: `ceil(chars / 4) + 4`
///
/// Not a tokenizer. It only has to grow with content so budgets behave consistently.
pub fn estimate_tokens(content: &str) -> usize {
    content.chars().count().div_ceil(4) + MESSAGE_OVERHEAD_TOKENS
}

/// One turn of the reconstructed thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: NodeRole,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: NodeRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Root-to-target thread with its size estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub messages: Vec<ContextMessage>,
    pub path_length: usize,
    pub total_tokens: usize,
}

impl ConversationContext {
    /// Build from nodes already ordered root first
    pub fn from_path(path: Vec<Node>) -> Self {
        let messages: Vec<ContextMessage> = path
            .into_iter()
            .map(|node| ContextMessage::new(node.role, node.content))
            .collect();
        Self::from_messages(messages)
    }

    fn from_messages(messages: Vec<ContextMessage>) -> Self {
        let total_tokens = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        Self {
            path_length: messages.len(),
            total_tokens,
            messages,
        }
    }

    /// The node the context was built for
    pub fn target(&self) -> Option<&ContextMessage> {
        self.messages.last()
    }

    /// Trim the oldest non-SYSTEM messages until the estimate fits `max_tokens`
    ///
    /// SYSTEM messages and the target are always kept, so the result can still exceed
    /// the budget when those alone are too large.
    pub fn within_budget(&self, max_tokens: usize) -> ConversationContext {
        if self.total_tokens <= max_tokens || self.messages.is_empty() {
            return self.clone();
        }

        let last = self.messages.len() - 1;
        let mut total = self.total_tokens;
        let mut keep = vec![true; self.messages.len()];

        for (i, message) in self.messages.iter().enumerate().take(last) {
            if total <= max_tokens {
                break;
            }
            if message.role == NodeRole::System {
                continue;
            }
            keep[i] = false;
            total -= estimate_tokens(&message.content);
        }

        let messages = self
            .messages
            .iter()
            .zip(keep)
            .filter_map(|(message, keep)| keep.then(|| message.clone()))
            .collect();
        Self::from_messages(messages)
    }
}

/// Reconstructs conversation threads from the store
#[derive(Clone)]
pub struct ContextBuilder {
    store: Arc<dyn NodeStore>,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Thread from the root of `node_id`'s tree down to `node_id`
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if `node_id` itself does not exist; store failures are passed on.
    pub async fn build_conversation_context(
        &self,
        node_id: &str,
    ) -> Result<ConversationContext, NodeServiceError> {
        let target = self
            .store
            .get_node(node_id)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(node_id))?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut path = Vec::new();
        let mut current = target;

        loop {
            visited.insert(current.id.clone());
            let parent_id = current.parent_id.clone();
            path.push(current);

            let Some(parent_id) = parent_id else {
                break;
            };

            if visited.contains(&parent_id) {
                tracing::warn!(
                    "Cycle detected at node {} while building context for {}",
                    parent_id,
                    node_id
                );
                break;
            }

            match self.store.get_node(&parent_id).await? {
                Some(parent) => current = parent,
                None => {
                    tracing::debug!(
                        "Parent {} of context path for {} is missing, treating as root",
                        parent_id,
                        node_id
                    );
                    break;
                }
            }
        }

        path.reverse();
        let context = ConversationContext::from_path(path);
        tracing::debug!(
            "Built context for {}: {} messages, ~{} tokens",
            node_id,
            context.path_length,
            context.total_tokens
        );
        Ok(context)
    }
}

#[cfg(test)]
#[path = "context_builder_test.rs"]
mod context_builder_test;

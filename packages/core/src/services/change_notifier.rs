//! Change Notifier - Watching a Node Converge
//!
//! A subscriber asks for a node id and gets a finite stream of [`NodeChangeEvent`]s:
//!
//! 1. one `update` with the current content and streaming flag
//! 2. if the node is not streaming, one `complete`, then the stream ends
//! 3. otherwise the node is re-read every poll interval: changed content yields
//!    `update`, `streaming = false` yields `complete`, a deleted node yields `error`,
//!    and running out of ticks yields `timeout`. Each of those last three ends the stream
//!
//! Dropping the stream stops polling immediately; nothing runs in the background.
//!
//! The store has no change feed, so `PollingNotifier` re-reads. The `ChangeNotifier`
//! trait keeps subscribers independent of that, so a push-based implementation can
//! replace it without changing the event contract.

use crate::db::NodeStore;
use crate::models::Node;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Consecutive failed reads tolerated before giving up with an `error` event
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub poll_interval: Duration,
    pub max_ticks: u32,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_ticks: 300,
        }
    }
}

/// One observable step of a node's convergence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum NodeChangeEvent {
    Update { content: String, streaming: bool },
    Complete { content: String, streaming: bool },
    Error { error: String },
    Timeout { error: String },
}

impl NodeChangeEvent {
    fn update(node: &Node) -> Self {
        Self::Update {
            content: node.content.clone(),
            streaming: node.metadata.is_streaming(),
        }
    }

    fn complete(node: &Node) -> Self {
        Self::Complete {
            content: node.content.clone(),
            streaming: false,
        }
    }

    /// Event name used for SSE framing
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// JSON payload: `{content, streaming}` or `{error}`
    pub fn payload(&self) -> Value {
        match self {
            Self::Update { content, streaming } | Self::Complete { content, streaming } => {
                json!({ "content": content, "streaming": streaming })
            }
            Self::Error { error } | Self::Timeout { error } => json!({ "error": error }),
        }
    }

    /// True for events after which nothing else is emitted
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Update { .. })
    }
}

pub type NodeEventStream = BoxStream<'static, NodeChangeEvent>;

pub trait ChangeNotifier: Send + Sync {
    /// Events for `node_id`; the stream ends after its first terminal event
    fn subscribe(&self, node_id: String) -> NodeEventStream;
}

/// `ChangeNotifier` that re-reads the node on a fixed interval
#[derive(Clone)]
pub struct PollingNotifier {
    store: Arc<dyn NodeStore>,
    config: NotifierConfig,
}

impl PollingNotifier {
    pub fn new(store: Arc<dyn NodeStore>, config: NotifierConfig) -> Self {
        Self { store, config }
    }
}

impl ChangeNotifier for PollingNotifier {
    fn subscribe(&self, node_id: String) -> NodeEventStream {
        let store = self.store.clone();
        let NotifierConfig {
            poll_interval,
            max_ticks,
        } = self.config.clone();

        Box::pin(async_stream::stream! {
            let mut last_content = match store.get_node(&node_id).await {
                Ok(Some(node)) => {
                    yield NodeChangeEvent::update(&node);
                    if !node.metadata.is_streaming() {
                        yield NodeChangeEvent::complete(&node);
                        return;
                    }
                    node.content
                }
                Ok(None) => {
                    yield NodeChangeEvent::Error { error: format!("Node not found: {}", node_id) };
                    return;
                }
                Err(e) => {
                    tracing::warn!("Initial read of node {} failed: {}", node_id, e);
                    yield NodeChangeEvent::Error { error: format!("Failed to read node: {}", e) };
                    return;
                }
            };

            tracing::debug!("Polling node {} every {:?}", node_id, poll_interval);

            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + poll_interval,
                poll_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut read_errors = 0;

            for _ in 0..max_ticks {
                ticker.tick().await;

                let node = match store.get_node(&node_id).await {
                    Ok(Some(node)) => node,
                    Ok(None) => {
                        yield NodeChangeEvent::Error {
                            error: format!("Node {} was deleted", node_id),
                        };
                        return;
                    }
                    Err(e) => {
                        read_errors += 1;
                        tracing::warn!(
                            "Polling node {} failed ({}/{}): {}",
                            node_id,
                            read_errors,
                            MAX_CONSECUTIVE_READ_ERRORS,
                            e
                        );
                        if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                            yield NodeChangeEvent::Error { error: format!("Failed to read node: {}", e) };
                            return;
                        }
                        continue;
                    }
                };
                read_errors = 0;

                if node.content != last_content {
                    yield NodeChangeEvent::update(&node);
                    last_content = node.content.clone();
                }

                if !node.metadata.is_streaming() {
                    yield NodeChangeEvent::complete(&node);
                    return;
                }
            }

            tracing::debug!("Node {} still streaming after {} polls", node_id, max_ticks);
            yield NodeChangeEvent::Timeout {
                error: format!("Timed out waiting for node {} to finish streaming", node_id),
            };
        })
    }
}

#[cfg(test)]
#[path = "change_notifier_test.rs"]
mod change_notifier_test;

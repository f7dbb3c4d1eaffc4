//! Streaming Synchronizer - Token Stream to Node Content
//!
//! Bridges a provider's `TokenStream` into two places at once:
//!
//! 1. the caller, who receives every fragment as soon as it arrives
//! 2. the assistant node's `content`, persisted as it grows
//!
//! ## State machine
//!
//! - **CREATED**: `create_assistant_node()` stores an empty ASSISTANT node with
//!   `streaming = true`
//! - **ACCUMULATING**: each fragment is appended to an accumulator and forwarded. At
//!   most once per throttle interval the full accumulator is handed to the background
//!   `ContentWriter` (never awaited; failures are logged)
//! - **COMPLETE**: at end of stream the writer is drained, then one awaited write stores
//!   the full content with `streaming = false`. Only after it succeeds is the caller's
//!   stream closed. A failed final write is sent to the caller as an error
//! - **FAILED**: an upstream error, or the caller dropping its stream, stops consumption.
//!   No further writes are made. Upstream errors are forwarded to the caller
//!
//! The forwarded fragments always concatenate to a prefix of the accumulator, and to
//! exactly the persisted content after COMPLETE.

use crate::models::{ContentUpdate, CreateNodeParams, Node, NodeMetadata, NodeRole};
use crate::services::content_writer::ContentWriter;
use crate::services::generation::{GenerationError, TokenStream};
use crate::services::NodeService;
use crate::services::NodeServiceError;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Minimum time between intermediate writes
    pub throttle: Duration,
    /// Fragments buffered between the synchronizer and a slow caller
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(50),
            channel_capacity: 64,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The token stream failed; already forwarded fragments stand
    #[error("Upstream generation failed: {0}")]
    Upstream(#[from] GenerationError),

    /// The final write failed, so the stored node never reflects completion
    #[error("Failed to persist final content for node {node_id}: {message}")]
    Persistence { node_id: String, message: String },

    /// The caller stopped reading before the stream ended
    #[error("Stream for node {node_id} was cancelled by the caller")]
    Cancelled { node_id: String },
}

/// Result of a stream that reached COMPLETE
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub node_id: String,
    pub content: String,
    pub fragments: usize,
    /// Intermediate writes that succeeded (excludes the final write)
    pub intermediate_writes: usize,
}

/// Where a new assistant node goes and what produced it
#[derive(Debug, Clone, Default)]
pub struct AssistantNodeParams {
    pub project_id: String,
    pub parent_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub position_x: f64,
    pub position_y: f64,
}

/// Caller's side of a running synchronization
///
/// Implements `Stream` over the forwarded fragments. Dropping it cancels generation.
pub struct StreamingSession {
    node_id: String,
    fragments: ReceiverStream<Result<String, SyncError>>,
    task: JoinHandle<Result<SyncOutcome, SyncError>>,
}

impl StreamingSession {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Split into the fragment stream and the background task's handle
    ///
    /// The handle resolves once the final write has happened (or failed).
    pub fn into_parts(
        self,
    ) -> (
        ReceiverStream<Result<String, SyncError>>,
        JoinHandle<Result<SyncOutcome, SyncError>>,
    ) {
        (self.fragments, self.task)
    }

    /// Drain every fragment, then wait for the final write
    pub async fn drain(self) -> Result<SyncOutcome, SyncError> {
        let node_id = self.node_id.clone();
        let (mut fragments, task) = self.into_parts();
        while let Some(item) = fragments.next().await {
            item?;
        }
        task.await.map_err(|e| SyncError::Persistence {
            node_id,
            message: format!("streaming task failed: {}", e),
        })?
    }
}

impl Stream for StreamingSession {
    type Item = Result<String, SyncError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.fragments).poll_next(cx)
    }
}

/// Starts and drives streaming sessions
#[derive(Clone)]
pub struct StreamingSynchronizer {
    service: NodeService,
    config: StreamingConfig,
}

impl StreamingSynchronizer {
    pub fn new(service: NodeService, config: StreamingConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// CREATED: store an empty, streaming ASSISTANT node
    pub async fn create_assistant_node(
        &self,
        params: AssistantNodeParams,
    ) -> Result<Node, NodeServiceError> {
        self.service
            .create_node(CreateNodeParams {
                project_id: params.project_id,
                parent_id: params.parent_id,
                role: NodeRole::Assistant,
                content: String::new(),
                position_x: params.position_x,
                position_y: params.position_y,
                metadata: NodeMetadata::streaming(params.provider, params.model),
            })
            .await
    }

    /// Feed `source` into node `node_id` and forward it to the returned session
    ///
    /// Must be called inside a Tokio runtime; the work runs on a spawned task.
    pub fn start(&self, node_id: impl Into<String>, source: TokenStream) -> StreamingSession {
        let node_id = node_id.into();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let task = tokio::spawn(drive(
            self.service.clone(),
            node_id.clone(),
            source,
            tx,
            self.config.throttle,
        ));

        StreamingSession {
            node_id,
            fragments: ReceiverStream::new(rx),
            task,
        }
    }
}

async fn drive(
    service: NodeService,
    node_id: String,
    mut source: TokenStream,
    tx: mpsc::Sender<Result<String, SyncError>>,
    throttle: Duration,
) -> Result<SyncOutcome, SyncError> {
    let writer = ContentWriter::spawn(service.clone(), node_id.clone());
    let mut accumulated = String::new();
    let mut fragments = 0;
    let mut last_write = Instant::now();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => None,
            next = source.next() => Some(next),
        };

        let fragment = match next {
            // Caller went away while we waited on the source
            None => return cancelled(writer, &node_id).await,
            Some(None) => break,
            Some(Some(Err(e))) => {
                writer.abort().await;
                tracing::warn!("Generation for node {} failed: {}", node_id, e);
                let err = SyncError::Upstream(e);
                let _ = tx.send(Err(err.clone())).await;
                return Err(err);
            }
            Some(Some(Ok(fragment))) => fragment,
        };

        accumulated.push_str(&fragment);
        fragments += 1;

        if tx.send(Ok(fragment)).await.is_err() {
            return cancelled(writer, &node_id).await;
        }

        if last_write.elapsed() >= throttle {
            writer.submit(accumulated.clone());
            last_write = Instant::now();
        }
    }

    let intermediate_writes = writer.finish().await;

    let update = ContentUpdate::with_metadata(accumulated.clone(), NodeMetadata::finished());
    if let Err(e) = service.update_node_content(&node_id, update).await {
        tracing::error!("Final write for node {} failed: {}", node_id, e);
        let err = SyncError::Persistence {
            node_id: node_id.clone(),
            message: e.to_string(),
        };
        let _ = tx.send(Err(err.clone())).await;
        return Err(err);
    }

    tracing::debug!(
        "Node {} complete: {} fragments, {} bytes, {} intermediate writes",
        node_id,
        fragments,
        accumulated.len(),
        intermediate_writes
    );

    // Dropping `tx` here closes the caller's stream, after the final write
    drop(tx);
    Ok(SyncOutcome {
        node_id,
        content: accumulated,
        fragments,
        intermediate_writes,
    })
}

async fn cancelled(writer: ContentWriter, node_id: &str) -> Result<SyncOutcome, SyncError> {
    writer.abort().await;
    tracing::warn!("Caller disconnected; generation for node {} stopped", node_id);
    Err(SyncError::Cancelled {
        node_id: node_id.to_string(),
    })
}

#[cfg(test)]
#[path = "streaming_test.rs"]
mod streaming_test;

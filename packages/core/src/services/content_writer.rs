//! Background Content Writer
//!
//! The best-effort tier of the streaming write path. The streaming loop hands the
//! accumulated content to `submit()`, which never blocks; a background task persists
//! the most recent value it has not yet written.
//!
//! ## Coalescing
//!
//! Submissions go through a `watch` channel, so while a write is in flight newer
//! submissions replace each other and only the latest one is written next. A slow
//! store therefore produces fewer writes, never a queue.
//!
//! ## Shutdown
//!
//! `finish()` flushes the last pending value and waits for the task to exit, so no
//! intermediate write can land after a subsequent final write. `abort()` drops
//! whatever is pending and stops the task.

use crate::models::ContentUpdate;
use crate::services::NodeService;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub(crate) struct ContentWriter {
    latest: watch::Sender<Option<String>>,
    task: JoinHandle<usize>,
}

impl ContentWriter {
    /// Start the background task for `node_id`
    pub fn spawn(service: NodeService, node_id: String) -> Self {
        let (latest, mut pending) = watch::channel(None::<String>);

        let task = tokio::spawn(async move {
            let mut writes = 0;
            while pending.changed().await.is_ok() {
                let Some(content) = pending.borrow_and_update().clone() else {
                    continue;
                };

                // Failures are non-fatal: the final write supersedes this one
                match service
                    .update_node_content(&node_id, ContentUpdate::new(content))
                    .await
                {
                    Ok(_) => writes += 1,
                    Err(e) => {
                        tracing::warn!("Throttled write for node {} failed: {}", node_id, e)
                    }
                }
            }
            writes
        });

        Self { latest, task }
    }

    /// Queue `content` for writing, replacing anything not yet written
    pub fn submit(&self, content: String) {
        self.latest.send_replace(Some(content));
    }

    /// Write whatever is pending, then stop; returns the number of successful writes
    pub async fn finish(self) -> usize {
        let Self { latest, task } = self;
        drop(latest);
        task.await.unwrap_or_else(|e| {
            tracing::warn!("Content writer task ended abnormally: {}", e);
            0
        })
    }

    /// Stop without writing anything further
    pub async fn abort(self) {
        self.task.abort();
        // A cancelled task reports JoinError::Cancelled, which is expected here
        let _ = self.task.await;
    }
}

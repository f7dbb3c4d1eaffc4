//! Tests for the streaming synchronizer: forwarding, throttled writes, final write,
//! upstream failure, caller cancellation and persistence failures.

use super::*;
use crate::db::{DatabaseError, DatabaseService, NodeStore, TursoStore};
use crate::models::{CreateProjectParams, PositionUpdate, Project};
use crate::services::generation::{GenerationProvider, GenerationRequest, ScriptedProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Delegates to a real store, optionally failing content writes
struct FlakyStore {
    inner: TursoStore,
    fail_intermediate: bool,
    fail_final: bool,
}

#[async_trait]
impl NodeStore for FlakyStore {
    async fn create_project(&self, project: Project) -> Result<Project, DatabaseError> {
        self.inner.create_project(project).await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, DatabaseError> {
        self.inner.get_project(id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, DatabaseError> {
        self.inner.list_projects().await
    }

    async fn delete_project(&self, id: &str) -> Result<bool, DatabaseError> {
        self.inner.delete_project(id).await
    }

    async fn create_node(&self, node: Node) -> Result<Node, DatabaseError> {
        self.inner.create_node(node).await
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        self.inner.get_node(id).await
    }

    async fn update_node_content(
        &self,
        id: &str,
        content: &str,
        metadata: &NodeMetadata,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let is_final = !metadata.is_streaming();
        if (is_final && self.fail_final) || (!is_final && self.fail_intermediate) {
            return Err(DatabaseError::sql_execution("injected write failure"));
        }
        self.inner
            .update_node_content(id, content, metadata, updated_at)
            .await
    }

    async fn batch_update_positions(
        &self,
        updates: &[PositionUpdate],
        updated_at: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        self.inner.batch_update_positions(updates, updated_at).await
    }

    async fn list_nodes_for_project(&self, project_id: &str) -> Result<Vec<Node>, DatabaseError> {
        self.inner.list_nodes_for_project(project_id).await
    }

    async fn list_root_nodes(&self, project_id: &str) -> Result<Vec<Node>, DatabaseError> {
        self.inner.list_root_nodes(project_id).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool, DatabaseError> {
        self.inner.delete_node(id).await
    }
}

struct Harness {
    service: NodeService,
    synchronizer: StreamingSynchronizer,
    assistant: Node,
    _temp: TempDir,
}

async fn harness_with(fail_intermediate: bool, fail_final: bool, throttle_ms: u64) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap(),
    );
    let store: Arc<dyn NodeStore> = Arc::new(FlakyStore {
        inner: TursoStore::new(db),
        fail_intermediate,
        fail_final,
    });
    let service = NodeService::new(store);

    let project = service
        .create_project(CreateProjectParams {
            name: "Streaming".into(),
            description: None,
        })
        .await
        .unwrap();
    let question = service
        .create_node(CreateNodeParams {
            project_id: project.id.clone(),
            parent_id: None,
            role: NodeRole::User,
            content: "Say hello".into(),
            position_x: 0.0,
            position_y: 0.0,
            metadata: NodeMetadata::default(),
        })
        .await
        .unwrap();

    let synchronizer = StreamingSynchronizer::new(
        service.clone(),
        StreamingConfig {
            throttle: Duration::from_millis(throttle_ms),
            ..StreamingConfig::default()
        },
    );
    let assistant = synchronizer
        .create_assistant_node(AssistantNodeParams {
            project_id: project.id,
            parent_id: Some(question.id),
            provider: Some("scripted".into()),
            model: None,
            ..AssistantNodeParams::default()
        })
        .await
        .unwrap();

    Harness {
        service,
        synchronizer,
        assistant,
        _temp: temp_dir,
    }
}

async fn harness() -> Harness {
    harness_with(false, false, 10).await
}

async fn scripted(provider: ScriptedProvider) -> TokenStream {
    provider
        .stream(GenerationRequest {
            messages: vec![],
            model: None,
        })
        .await
        .unwrap()
}

/// A source the test feeds by hand
fn manual_source() -> (mpsc::UnboundedSender<String>, TokenStream) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    (tx, Box::pin(UnboundedReceiverStream::new(rx).map(Ok)))
}

#[tokio::test]
async fn test_assistant_node_starts_empty_and_streaming() {
    let h = harness().await;
    assert_eq!(h.assistant.role, NodeRole::Assistant);
    assert_eq!(h.assistant.content, "");
    assert!(h.assistant.metadata.is_streaming());
    assert_eq!(h.assistant.metadata.provider.as_deref(), Some("scripted"));
}

#[tokio::test]
async fn test_forwarded_fragments_equal_final_content() {
    let h = harness().await;
    let source = scripted(ScriptedProvider::new(["Hel", "lo, ", "world", "!"])).await;

    let session = h.synchronizer.start(h.assistant.id.clone(), source);
    assert_eq!(session.node_id(), h.assistant.id);

    let (fragments, task) = session.into_parts();
    let forwarded: Vec<String> = fragments.map(|item| item.unwrap()).collect().await;
    let outcome = task.await.unwrap().unwrap();

    assert_eq!(forwarded, vec!["Hel", "lo, ", "world", "!"]);
    assert_eq!(outcome.content, forwarded.concat());
    assert_eq!(outcome.fragments, 4);

    // The stream closed only after the final write, so the node is already final
    let node = h.service.get_node(&h.assistant.id).await.unwrap();
    assert_eq!(node.content, "Hello, world!");
    assert_eq!(node.metadata.streaming, Some(false));
    assert_eq!(node.metadata.provider.as_deref(), Some("scripted"));
}

#[tokio::test]
async fn test_empty_stream_still_completes() {
    let h = harness().await;
    let source = scripted(ScriptedProvider::new(Vec::<String>::new())).await;

    let outcome = h
        .synchronizer
        .start(h.assistant.id.clone(), source)
        .drain()
        .await
        .unwrap();
    assert_eq!(outcome.content, "");

    let node = h.service.get_node(&h.assistant.id).await.unwrap();
    assert_eq!(node.metadata.streaming, Some(false));
}

#[tokio::test]
async fn test_intermediate_writes_are_throttled_prefixes() {
    let h = harness().await;
    let (feed, source) = manual_source();
    let mut session = h.synchronizer.start(h.assistant.id.clone(), source);

    feed.send("a".into()).unwrap();
    assert_eq!(session.next().await.unwrap().unwrap(), "a");
    tokio::time::sleep(Duration::from_millis(30)).await;
    feed.send("b".into()).unwrap();
    assert_eq!(session.next().await.unwrap().unwrap(), "b");

    // Give the background writer time to persist "ab"
    let mut persisted = String::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let node = h.service.get_node(&h.assistant.id).await.unwrap();
        assert!(node.metadata.is_streaming());
        persisted = node.content;
        if persisted == "ab" {
            break;
        }
    }
    assert_eq!(persisted, "ab");

    feed.send("c".into()).unwrap();
    drop(feed);
    let outcome = session.drain().await.unwrap();
    assert_eq!(outcome.content, "abc");
    assert!(outcome.intermediate_writes >= 1);
}

#[tokio::test]
async fn test_upstream_failure_forwards_error_and_stops_writing() {
    let h = harness_with(false, false, 60_000).await;
    let source = scripted(ScriptedProvider::new(["one ", "two ", "three"]).failing_after(2)).await;

    let (fragments, task) = h.synchronizer.start(h.assistant.id.clone(), source).into_parts();
    let items: Vec<_> = fragments.collect().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0], Ok("one ".to_string()));
    assert_eq!(items[1], Ok("two ".to_string()));
    assert!(matches!(items[2], Err(SyncError::Upstream(_))));
    assert!(matches!(task.await.unwrap(), Err(SyncError::Upstream(_))));

    // No final write happened
    let node = h.service.get_node(&h.assistant.id).await.unwrap();
    assert!(node.metadata.is_streaming());
    assert_eq!(node.content, "");
}

#[tokio::test]
async fn test_caller_disconnect_cancels_generation() {
    let h = harness().await;
    let (feed, source) = manual_source();
    let (mut fragments, task) = h.synchronizer.start(h.assistant.id.clone(), source).into_parts();

    feed.send("partial".into()).unwrap();
    assert_eq!(fragments.next().await.unwrap().unwrap(), "partial");
    drop(fragments);

    let result = task.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled { .. })));

    // The source was dropped, so the producer sees a closed channel
    assert!(feed.is_closed());

    let node = h.service.get_node(&h.assistant.id).await.unwrap();
    assert!(node.metadata.is_streaming());
}

#[tokio::test]
async fn test_intermediate_write_failures_are_swallowed() {
    let h = harness_with(true, false, 0).await;
    let source = scripted(
        ScriptedProvider::new(["x", "y", "z"]).with_delay(Duration::from_millis(5)),
    )
    .await;

    let outcome = h
        .synchronizer
        .start(h.assistant.id.clone(), source)
        .drain()
        .await
        .unwrap();
    assert_eq!(outcome.content, "xyz");
    assert_eq!(outcome.intermediate_writes, 0);

    let node = h.service.get_node(&h.assistant.id).await.unwrap();
    assert_eq!(node.content, "xyz");
    assert_eq!(node.metadata.streaming, Some(false));
}

#[tokio::test]
async fn test_final_write_failure_is_surfaced() {
    let h = harness_with(false, true, 60_000).await;
    let source = scripted(ScriptedProvider::new(["done"])).await;

    let (fragments, task) = h.synchronizer.start(h.assistant.id.clone(), source).into_parts();
    let items: Vec<_> = fragments.collect().await;

    assert_eq!(items[0], Ok("done".to_string()));
    assert!(matches!(items.last(), Some(Err(SyncError::Persistence { .. }))));
    assert!(matches!(task.await.unwrap(), Err(SyncError::Persistence { .. })));

    let node = h.service.get_node(&h.assistant.id).await.unwrap();
    assert!(node.metadata.is_streaming());
}

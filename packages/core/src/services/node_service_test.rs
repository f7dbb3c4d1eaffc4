//! Tests for NodeService: forest invariants, content updates, batches and forks.

use super::*;
use crate::db::{DatabaseService, TursoStore};
use crate::models::NodeRole;
use serde_json::json;
use tempfile::TempDir;

async fn create_test_service() -> (NodeService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap(),
    );
    let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
    (NodeService::new(store), temp_dir)
}

async fn create_project(service: &NodeService, name: &str) -> Project {
    service
        .create_project(CreateProjectParams {
            name: name.to_string(),
            description: None,
        })
        .await
        .unwrap()
}

fn params(project_id: &str, parent_id: Option<&str>, role: NodeRole, content: &str) -> CreateNodeParams {
    CreateNodeParams {
        project_id: project_id.to_string(),
        parent_id: parent_id.map(str::to_string),
        role,
        content: content.to_string(),
        position_x: 10.0,
        position_y: 20.0,
        metadata: NodeMetadata::default(),
    }
}

#[tokio::test]
async fn test_create_project_requires_name() {
    let (service, _temp) = create_test_service().await;
    let err = service
        .create_project(CreateProjectParams {
            name: "   ".to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::ValidationFailed(ValidationError::MissingField(_))
    ));
}

#[tokio::test]
async fn test_first_root_sets_root_node_id() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Forest").await;
    assert!(project.root_node_id.is_none());

    let first = service
        .create_node(params(&project.id, None, NodeRole::User, "first"))
        .await
        .unwrap();
    let second = service
        .create_node(params(&project.id, None, NodeRole::User, "second"))
        .await
        .unwrap();

    assert_eq!(first.metadata.is_root, Some(true));
    assert_eq!(second.metadata.is_root, Some(true));

    let project = service.get_project(&project.id).await.unwrap();
    assert_eq!(project.root_node_id.as_deref(), Some(first.id.as_str()));

    let roots = service.list_root_nodes(&project.id).await.unwrap();
    assert_eq!(
        roots.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        vec![first.id.as_str(), second.id.as_str()]
    );
}

#[tokio::test]
async fn test_create_node_rejects_bad_references() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "A").await;
    let other = create_project(&service, "B").await;
    let foreign_root = service
        .create_node(params(&other.id, None, NodeRole::User, "elsewhere"))
        .await
        .unwrap();

    let err = service
        .create_node(params("no-such-project", None, NodeRole::User, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::ProjectNotFound { .. }));

    let err = service
        .create_node(params(&project.id, Some("no-such-node"), NodeRole::User, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::NodeNotFound { ref id } if id == "no-such-node"));

    let err = service
        .create_node(params(&project.id, Some(&foreign_root.id), NodeRole::User, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::InvalidParent { .. }));

    let mut streaming_user = params(&project.id, None, NodeRole::User, "x");
    streaming_user.metadata = NodeMetadata::streaming(None, None);
    let err = service.create_node(streaming_user).await.unwrap_err();
    assert!(matches!(err, NodeServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_create_then_get_round_trips() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Round trip").await;

    let mut input = params(&project.id, None, NodeRole::User, "Hello, world");
    input.metadata.extra.insert("color".into(), json!("green"));
    let created = service.create_node(input).await.unwrap();

    let first = service.get_node(&created.id).await.unwrap();
    let second = service.get_node(&created.id).await.unwrap();

    assert_eq!(first, created);
    assert_eq!(first, second);
    assert_eq!(first.content, "Hello, world");
    assert_eq!(first.position_x, 10.0);
    assert_eq!(first.position_y, 20.0);
    assert_eq!(first.metadata.extra.get("color"), Some(&json!("green")));
}

#[tokio::test]
async fn test_get_missing_node_is_not_found() {
    let (service, _temp) = create_test_service().await;
    let err = service.get_node("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_content_replaces_and_merges() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Updates").await;
    let root = service
        .create_node(params(&project.id, None, NodeRole::User, "q"))
        .await
        .unwrap();

    let mut input = params(&project.id, Some(&root.id), NodeRole::Assistant, "");
    input.metadata = NodeMetadata::streaming(Some("echo".into()), Some("echo-1".into()));
    let assistant = service.create_node(input).await.unwrap();

    let partial = service
        .update_node_content(&assistant.id, ContentUpdate::new("Hel"))
        .await
        .unwrap();
    assert_eq!(partial.content, "Hel");
    assert!(partial.metadata.is_streaming());

    let done = service
        .update_node_content(
            &assistant.id,
            ContentUpdate::with_metadata("Hello", NodeMetadata::finished()),
        )
        .await
        .unwrap();
    assert_eq!(done.content, "Hello");
    assert_eq!(done.metadata.streaming, Some(false));
    assert_eq!(done.metadata.provider.as_deref(), Some("echo"));
    assert_eq!(done.metadata.model.as_deref(), Some("echo-1"));
    assert!(done.updated_at >= assistant.updated_at);
    assert_eq!(done.created_at, assistant.created_at);
}

#[tokio::test]
async fn test_streaming_cannot_be_re_enabled() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Once").await;
    let root = service
        .create_node(params(&project.id, None, NodeRole::User, "q"))
        .await
        .unwrap();
    let mut input = params(&project.id, Some(&root.id), NodeRole::Assistant, "");
    input.metadata = NodeMetadata::streaming(None, None);
    let assistant = service.create_node(input).await.unwrap();

    service
        .update_node_content(
            &assistant.id,
            ContentUpdate::with_metadata("a", NodeMetadata::finished()),
        )
        .await
        .unwrap();

    let err = service
        .update_node_content(
            &assistant.id,
            ContentUpdate::with_metadata("ab", NodeMetadata::streaming(None, None)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::ValidationFailed(_)));
    assert_eq!(service.get_node(&assistant.id).await.unwrap().content, "a");
}

#[tokio::test]
async fn test_update_missing_node_is_not_found() {
    let (service, _temp) = create_test_service().await;
    let err = service
        .update_node_content("ghost", ContentUpdate::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::NodeNotFound { .. }));
}

#[tokio::test]
async fn test_batch_positions_all_or_nothing() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Batch").await;
    let a = service
        .create_node(params(&project.id, None, NodeRole::User, "a"))
        .await
        .unwrap();
    let b = service
        .create_node(params(&project.id, Some(&a.id), NodeRole::Assistant, "b"))
        .await
        .unwrap();

    let err = service
        .batch_update_positions(vec![
            PositionUpdate {
                node_id: a.id.clone(),
                position_x: 500.0,
                position_y: 500.0,
            },
            PositionUpdate {
                node_id: "missing".into(),
                position_x: 1.0,
                position_y: 1.0,
            },
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::NodeNotFound { ref id } if id == "missing"));
    assert_eq!(service.get_node(&a.id).await.unwrap().position_x, 10.0);

    let count = service
        .batch_update_positions(vec![
            PositionUpdate {
                node_id: a.id.clone(),
                position_x: 1.0,
                position_y: 2.0,
            },
            PositionUpdate {
                node_id: b.id.clone(),
                position_x: 3.0,
                position_y: 4.0,
            },
        ])
        .await
        .unwrap();
    assert_eq!(count, 2);
    let b = service.get_node(&b.id).await.unwrap();
    assert_eq!((b.position_x, b.position_y), (3.0, 4.0));
}

/// Deeper than SQLite's cascade nesting limit of 1000
const DEEP_CHAIN: usize = 1100;

/// Create a single chain of `len` nodes, root first
async fn create_chain(service: &NodeService, project_id: &str, len: usize) -> Vec<Node> {
    let mut chain: Vec<Node> = Vec::with_capacity(len);
    for i in 0..len {
        let parent_id = chain.last().map(|n| n.id.clone());
        let role = if i % 2 == 0 { NodeRole::User } else { NodeRole::Assistant };
        let node = service
            .create_node(params(project_id, parent_id.as_deref(), role, &format!("turn {}", i)))
            .await
            .unwrap();
        chain.push(node);
    }
    chain
}

#[tokio::test]
async fn test_delete_node_removes_subtree() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Prune").await;
    let chain = create_chain(&service, &project.id, DEEP_CHAIN).await;
    let (root, branch, leaf) = (&chain[0], &chain[1], &chain[DEEP_CHAIN - 1]);

    service.delete_node(&branch.id).await.unwrap();

    assert!(service.get_node(&leaf.id).await.unwrap_err().is_not_found());
    let remaining = service.list_nodes_for_project(&project.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, root.id);
    assert!(service.delete_node(&branch.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_root_of_deep_chain() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Deep").await;
    let chain = create_chain(&service, &project.id, DEEP_CHAIN).await;

    service.delete_node(&chain[0].id).await.unwrap();

    assert!(service.list_nodes_for_project(&project.id).await.unwrap().is_empty());
    assert!(service.get_node(&chain[DEEP_CHAIN / 2].id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_project_removes_nodes() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Gone").await;
    let root = service
        .create_node(params(&project.id, None, NodeRole::User, "root"))
        .await
        .unwrap();

    service.delete_project(&project.id).await.unwrap();

    assert!(service.get_node(&root.id).await.unwrap_err().is_not_found());
    assert!(matches!(
        service.list_nodes_for_project(&project.id).await.unwrap_err(),
        NodeServiceError::ProjectNotFound { .. }
    ));
    assert!(service.list_projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_project_with_deep_chain() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Long talk").await;
    let other = create_project(&service, "Bystander").await;
    let chain = create_chain(&service, &project.id, DEEP_CHAIN).await;
    let kept = create_chain(&service, &other.id, 3).await;

    service.delete_project(&project.id).await.unwrap();

    assert!(service.get_node(&chain[DEEP_CHAIN - 1].id).await.unwrap_err().is_not_found());
    assert!(service.get_node(&chain[0].id).await.unwrap_err().is_not_found());
    assert_eq!(service.list_nodes_for_project(&other.id).await.unwrap().len(), kept.len());
    assert!(matches!(
        service.delete_project(&project.id).await.unwrap_err(),
        NodeServiceError::ProjectNotFound { .. }
    ));
}

#[tokio::test]
async fn test_conversation_tree_of_deep_chain_serializes() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Nested").await;
    let chain = create_chain(&service, &project.id, DEEP_CHAIN).await;

    let tree = service.get_conversation_tree(&project.id).await.unwrap();
    assert_eq!(tree.node_count, DEEP_CHAIN);
    assert_eq!(tree.tree.len(), 1);
    assert_eq!(tree.tree[0].size(), DEEP_CHAIN);

    let json = serde_json::to_string(&tree).unwrap();
    assert!(json.contains(&format!("\"id\":\"{}\"", chain[DEEP_CHAIN - 1].id)));
    assert_eq!(json.matches("\"children\":[").count(), DEEP_CHAIN);
}

#[tokio::test]
async fn test_fork_creates_sibling() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Fork").await;
    let root = service
        .create_node(params(&project.id, None, NodeRole::User, "question"))
        .await
        .unwrap();
    let mut input = params(&project.id, Some(&root.id), NodeRole::Assistant, "answer");
    input.metadata = NodeMetadata::streaming(Some("echo".into()), None);
    let answer = service.create_node(input).await.unwrap();

    let fork = service.fork_node(&answer.id, None).await.unwrap();
    assert_ne!(fork.id, answer.id);
    assert_eq!(fork.parent_id.as_deref(), Some(root.id.as_str()));
    assert_eq!(fork.role, NodeRole::Assistant);
    assert_eq!(fork.content, "answer");
    assert_eq!(fork.metadata.forked_from.as_deref(), Some(answer.id.as_str()));
    assert_eq!(fork.metadata.provider.as_deref(), Some("echo"));
    assert!(fork.metadata.streaming.is_none());

    let edited = service
        .fork_node(&root.id, Some("rephrased".into()))
        .await
        .unwrap();
    assert!(edited.is_root());
    assert_eq!(edited.content, "rephrased");
    assert_eq!(edited.metadata.is_root, Some(true));

    // Original untouched
    assert_eq!(service.get_node(&answer.id).await.unwrap(), answer);
}

#[tokio::test]
async fn test_auto_layout_empty_project() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Empty").await;
    let count = service
        .apply_auto_layout(&project.id, &LayoutConfig::default())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_auto_layout_persists_positions() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Layout").await;
    let root = service
        .create_node(params(&project.id, None, NodeRole::User, "root"))
        .await
        .unwrap();
    let left = service
        .create_node(params(&project.id, Some(&root.id), NodeRole::Assistant, "l"))
        .await
        .unwrap();
    let right = service
        .create_node(params(&project.id, Some(&root.id), NodeRole::Assistant, "r"))
        .await
        .unwrap();

    let count = service
        .apply_auto_layout(&project.id, &LayoutConfig::default())
        .await
        .unwrap();
    assert_eq!(count, 3);

    let root = service.get_node(&root.id).await.unwrap();
    let left = service.get_node(&left.id).await.unwrap();
    let right = service.get_node(&right.id).await.unwrap();
    assert_eq!((root.position_x, root.position_y), (150.0, 0.0));
    assert_eq!((left.position_x, left.position_y), (0.0, 150.0));
    assert_eq!((right.position_x, right.position_y), (300.0, 150.0));
}

#[tokio::test]
async fn test_conversation_tree_groups_children() {
    let (service, _temp) = create_test_service().await;
    let project = create_project(&service, "Tree").await;
    let root = service
        .create_node(params(&project.id, None, NodeRole::User, "Hello"))
        .await
        .unwrap();
    let reply = service
        .create_node(params(&project.id, Some(&root.id), NodeRole::Assistant, "Hi"))
        .await
        .unwrap();
    let follow_up = service
        .create_node(params(&project.id, Some(&root.id), NodeRole::User, "Again"))
        .await
        .unwrap();

    let tree = service.get_conversation_tree(&project.id).await.unwrap();
    assert_eq!(tree.node_count, 3);
    assert_eq!(tree.tree.len(), 1);
    assert_eq!(tree.tree[0].node.id, root.id);
    assert_eq!(
        tree.tree[0]
            .children
            .iter()
            .map(|c| c.node.id.as_str())
            .collect::<Vec<_>>(),
        vec![reply.id.as_str(), follow_up.id.as_str()]
    );

    let err = service.get_conversation_tree("missing").await.unwrap_err();
    assert!(matches!(err, NodeServiceError::ProjectNotFound { .. }));
}

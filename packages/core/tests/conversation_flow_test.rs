//! Conversation Flow Tests
//!
//! End-to-end checks of a chat turn through the public API: user node creation,
//! context reconstruction, streaming into the assistant node, observing it with the
//! change notifier, and re-laying out the grown forest.

#[cfg(test)]
mod conversation_flow_tests {
    use anyhow::Result;
    use arbor_core::db::{DatabaseService, NodeStore, TursoStore};
    use arbor_core::models::{CreateNodeParams, CreateProjectParams, NodeMetadata, NodeRole, Project};
    use arbor_core::services::{
        ChangeNotifier, ChatError, ChatRequest, ContextBuilder, ConversationService,
        NodeChangeEvent, NodeService, NodeServiceError, NotifierConfig, PollingNotifier,
        ProviderRegistry, ScriptedProvider, StreamingConfig, StreamingSynchronizer,
    };
    use arbor_core::tree::LayoutConfig;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct TestApp {
        nodes: NodeService,
        chat: ConversationService,
        notifier: PollingNotifier,
        _temp_dir: TempDir,
    }

    /// Helper to wire every service over a fresh database
    async fn create_test_app(registry: ProviderRegistry) -> Result<TestApp> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("test.db")).await?);
        let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));

        let nodes = NodeService::new(store.clone());
        let synchronizer = StreamingSynchronizer::new(
            nodes.clone(),
            StreamingConfig {
                throttle: Duration::from_millis(5),
                ..StreamingConfig::default()
            },
        );
        let chat = ConversationService::new(
            nodes.clone(),
            ContextBuilder::new(store.clone()),
            synchronizer,
            registry,
        );
        let notifier = PollingNotifier::new(
            store,
            NotifierConfig {
                poll_interval: Duration::from_millis(10),
                max_ticks: 500,
            },
        );

        Ok(TestApp {
            nodes,
            chat,
            notifier,
            _temp_dir: temp_dir,
        })
    }

    fn scripted_registry(provider: ScriptedProvider) -> ProviderRegistry {
        ProviderRegistry::new(Arc::new(provider))
    }

    async fn seed(app: &TestApp) -> Result<(Project, String)> {
        let project = app
            .nodes
            .create_project(CreateProjectParams {
                name: "Flow".into(),
                description: Some("end to end".into()),
            })
            .await?;
        let system = app
            .nodes
            .create_node(CreateNodeParams {
                project_id: project.id.clone(),
                parent_id: None,
                role: NodeRole::System,
                content: "You are terse.".into(),
                position_x: 0.0,
                position_y: 0.0,
                metadata: NodeMetadata::default(),
            })
            .await?;
        Ok((project, system.id))
    }

    fn request(project: &Project, parent: &str, message: &str) -> ChatRequest {
        ChatRequest {
            project_id: Some(project.id.clone()),
            parent_node_id: Some(parent.to_string()),
            message: Some(message.to_string()),
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn test_chat_turn_streams_into_assistant_node() -> Result<()> {
        let app = create_test_app(scripted_registry(
            ScriptedProvider::new(["Sure", ", ", "here", " it is."])
                .with_delay(Duration::from_millis(10)),
        ))
        .await?;
        let (project, system_id) = seed(&app).await?;

        let turn = app
            .chat
            .continue_conversation(request(&project, &system_id, "Give me an answer"))
            .await?;

        let user = turn.user_node.clone().expect("user node created");
        assert_eq!(user.parent_id.as_deref(), Some(system_id.as_str()));
        assert_eq!(turn.assistant_node.parent_id.as_deref(), Some(user.id.as_str()));
        assert!(turn.assistant_node.metadata.is_streaming());
        assert_eq!(turn.assistant_node.metadata.provider.as_deref(), Some("scripted"));
        assert!(turn.context_tokens > 0);

        // A second client watches the node while the first reads the stream
        let watcher = app.notifier.subscribe(turn.assistant_node.id.clone());
        let watched = tokio::spawn(watcher.collect::<Vec<_>>());

        let forwarded: Vec<String> = turn.session.map(|item| item.unwrap()).collect().await;
        assert_eq!(forwarded.concat(), "Sure, here it is.");

        let stored = app.nodes.get_node(&turn.assistant_node.id).await?;
        assert_eq!(stored.content, "Sure, here it is.");
        assert_eq!(stored.metadata.streaming, Some(false));

        let events = watched.await?;
        assert_eq!(
            events.last(),
            Some(&NodeChangeEvent::Complete {
                content: "Sure, here it is.".into(),
                streaming: false
            })
        );

        // The context of the reply is the whole thread
        let tree = app.nodes.get_conversation_tree(&project.id).await?;
        assert_eq!(tree.node_count, 3);
        assert_eq!(tree.tree[0].children[0].children[0].node.id, stored.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_skip_user_node_replies_under_parent() -> Result<()> {
        let app = create_test_app(scripted_registry(ScriptedProvider::new(["ok"]))).await?;
        let (project, system_id) = seed(&app).await?;

        let user = app
            .nodes
            .create_node(CreateNodeParams {
                project_id: project.id.clone(),
                parent_id: Some(system_id),
                role: NodeRole::User,
                content: "already stored".into(),
                position_x: 0.0,
                position_y: 150.0,
                metadata: NodeMetadata::default(),
            })
            .await?;

        let mut req = request(&project, &user.id, "already stored");
        req.skip_user_node = true;
        let turn = app.chat.continue_conversation(req).await?;

        assert!(turn.user_node.is_none());
        assert_eq!(turn.assistant_node.parent_id.as_deref(), Some(user.id.as_str()));
        assert_eq!(turn.assistant_node.position_y, 300.0);

        let outcome = turn.session.drain().await?;
        assert_eq!(outcome.content, "ok");
        assert_eq!(app.nodes.list_nodes_for_project(&project.id).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_fields_are_validation_errors() -> Result<()> {
        let app = create_test_app(ProviderRegistry::default()).await?;
        let (project, system_id) = seed(&app).await?;

        for (mut req, field) in [
            (request(&project, &system_id, "hi"), "projectId"),
            (request(&project, &system_id, "hi"), "parentNodeId"),
            (request(&project, &system_id, "hi"), "message"),
        ] {
            match field {
                "projectId" => req.project_id = None,
                "parentNodeId" => req.parent_node_id = Some("  ".into()),
                _ => req.message = None,
            }
            let err = app.chat.continue_conversation(req).await.err().unwrap();
            assert!(
                matches!(&err, ChatError::Service(NodeServiceError::ValidationFailed(_))),
                "{field}: {err}"
            );
            assert!(err.to_string().contains(field));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_provider_and_missing_parent() -> Result<()> {
        let app = create_test_app(ProviderRegistry::default()).await?;
        let (project, system_id) = seed(&app).await?;

        let mut req = request(&project, &system_id, "hi");
        req.provider = Some("nope".into());
        assert!(matches!(
            app.chat.continue_conversation(req).await.err(),
            Some(ChatError::UnknownProvider(name)) if name == "nope"
        ));

        let req = request(&project, "no-such-node", "hi");
        assert!(matches!(
            app.chat.continue_conversation(req).await.err(),
            Some(ChatError::Service(NodeServiceError::NodeNotFound { .. }))
        ));

        // Nothing was written by either failure
        assert_eq!(app.nodes.list_nodes_for_project(&project.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_start_failure_keeps_user_node() -> Result<()> {
        let app = create_test_app(scripted_registry(
            ScriptedProvider::new(["never"]).failing_to_start(),
        ))
        .await?;
        let (project, system_id) = seed(&app).await?;

        let err = app
            .chat
            .continue_conversation(request(&project, &system_id, "hello?"))
            .await
            .err();
        assert!(matches!(err, Some(ChatError::Generation(_))));

        let nodes = app.nodes.list_nodes_for_project(&project.id).await?;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].role, NodeRole::User);
        assert_eq!(nodes[1].content, "hello?");
        Ok(())
    }

    #[tokio::test]
    async fn test_layout_after_branching() -> Result<()> {
        let app = create_test_app(scripted_registry(ScriptedProvider::new(["a"]))).await?;
        let (project, system_id) = seed(&app).await?;

        for message in ["first branch", "second branch"] {
            let turn = app
                .chat
                .continue_conversation(request(&project, &system_id, message))
                .await?;
            turn.session.drain().await?;
        }

        let updated = app
            .nodes
            .apply_auto_layout(&project.id, &LayoutConfig::default())
            .await?;
        assert_eq!(updated, 5);

        let nodes = app.nodes.list_nodes_for_project(&project.id).await?;
        let users: Vec<_> = nodes.iter().filter(|n| n.role == NodeRole::User).collect();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].position_y, users[1].position_y);
        assert_ne!(users[0].position_x, users[1].position_x);
        Ok(())
    }
}

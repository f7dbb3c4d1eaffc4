//! Arbor HTTP server
//!
//! Exposes the conversation core as a REST API for the canvas client:
//! project and node CRUD, conversation tree retrieval, streaming chat,
//! per-node change notifications over SSE and auto-layout.
//!
//! # Architecture
//!
//! Endpoints are grouped by resource and merged into one router:
//! - `project_endpoints`: health, projects, project nodes, auto-layout
//! - `node_endpoints`: node CRUD, fork, context preview
//! - `tree_endpoints`: nested conversation tree
//! - `chat_endpoints`: chat/continue with a streamed text body
//! - `stream_endpoints`: Server-Sent Events per node
//!
//! # Security
//!
//! - CORS restricted to configured origins
//! - No authentication; the server is meant to run next to its client

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use arbor_core::db::NodeStore;
use arbor_core::services::{
    ChangeNotifier, ContextBuilder, ConversationService, NodeService, NotifierConfig,
    PollingNotifier, ProviderRegistry, StreamingConfig, StreamingSynchronizer,
};
use arbor_core::tree::LayoutConfig;

pub mod config;
mod http_error;

mod chat_endpoints;
mod node_endpoints;
mod project_endpoints;
mod stream_endpoints;
mod tree_endpoints;

pub use chat_endpoints::{NODE_ID_HEADER, USER_NODE_ID_HEADER};
pub use config::{ConfigError, ServerConfig};
pub use http_error::HttpError;

/// Application state shared across all endpoints
#[derive(Clone)]
pub struct AppState {
    pub nodes: NodeService,
    pub contexts: ContextBuilder,
    pub conversations: ConversationService,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub layout: LayoutConfig,
}

impl AppState {
    /// Wire every service over one store
    pub fn new(
        store: Arc<dyn NodeStore>,
        providers: ProviderRegistry,
        streaming: StreamingConfig,
        notifier: NotifierConfig,
        layout: LayoutConfig,
    ) -> Self {
        let nodes = NodeService::new(store.clone());
        let contexts = ContextBuilder::new(store.clone());
        let synchronizer = StreamingSynchronizer::new(nodes.clone(), streaming);
        let conversations =
            ConversationService::new(nodes.clone(), contexts.clone(), synchronizer, providers);

        Self {
            nodes,
            contexts,
            conversations,
            notifier: Arc::new(PollingNotifier::new(store, notifier)),
            layout,
        }
    }

    pub fn from_config(
        store: Arc<dyn NodeStore>,
        providers: ProviderRegistry,
        config: &ServerConfig,
    ) -> Self {
        Self::new(
            store,
            providers,
            config.streaming.clone(),
            config.notifier.clone(),
            config.layout,
        )
    }
}

/// Create the application router with all endpoint modules and no CORS layer
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(project_endpoints::routes(state.clone()))
        .merge(node_endpoints::routes(state.clone()))
        .merge(tree_endpoints::routes(state.clone()))
        .merge(chat_endpoints::routes(state.clone()))
        .merge(stream_endpoints::routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Create the CORS layer for the given origins
///
/// Node id headers of chat responses are exposed so browser clients can read them.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "CORS_ALLOW_ORIGIN",
                    value: origin.clone(),
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(NODE_ID_HEADER),
            HeaderName::from_static(USER_NODE_ID_HEADER),
        ])
        .allow_credentials(false))
}

/// Bind and serve until the process is stopped
///
/// # Errors
///
/// Returns error if the CORS configuration is invalid or the server fails to bind.
pub async fn start_server(state: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let app = create_router(state).layer(cors_layer(&config.cors_origins)?);

    let addr = config.socket_addr();
    tracing::info!("🚀 Arbor server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

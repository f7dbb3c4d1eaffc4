//! Arbor Server Binary
//!
//! # Usage
//!
//! ```bash
//! # Default settings (127.0.0.1:3001, ~/.arbor/database/arbor.db)
//! cargo run --bin arbor-server
//!
//! # Custom port and database
//! ARBOR_PORT=3002 ARBOR_DB_PATH=/tmp/arbor.db cargo run --bin arbor-server
//! ```
//!
//! See [`arbor_server::config`] for every environment variable. `RUST_LOG`
//! controls log verbosity (default `info`).

use std::sync::Arc;
use std::time::Duration;

use arbor_core::db::{DatabaseService, NodeStore, TursoStore};
use arbor_core::services::{EchoProvider, ProviderRegistry};
use arbor_server::{start_server, AppState, ServerConfig};

/// Pacing of the built-in echo provider, so its replies visibly stream
const ECHO_DELAY: Duration = Duration::from_millis(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("🌳 Arbor Server");
    tracing::info!("==================================");

    let config = ServerConfig::from_env()?;
    tracing::info!("📡 Address: {}", config.socket_addr());
    tracing::info!("📦 Database: {}", config.db_path.display());

    tracing::info!("🔧 Initializing services...");
    let db = Arc::new(DatabaseService::new(config.db_path.clone()).await?);
    let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));

    let providers = ProviderRegistry::new(Arc::new(EchoProvider::new().with_delay(ECHO_DELAY)));
    tracing::info!("🤖 Providers: {}", providers.names().join(", "));

    let state = AppState::from_config(store, providers, &config);
    tracing::info!("✅ Services initialized");

    start_server(state, &config).await
}

//! threatscope-server - Security Records Analysis Microservice
//!
//! Loads host and certificate datasets, fans each sampled record out to a
//! kind-specific analysis expert, merges the results into an executive
//! summary, and streams the whole run to callers as durable SSE events.

use anyhow::Result;
use std::sync::Arc;
use threatscope_common::config::AppConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use threatscope_server::graph::ExecutionGraph;
use threatscope_server::provider::OpenAiProvider;
use threatscope_server::records::FileRecordSource;
use threatscope_server::store::{MemoryStore, RunStore, SqliteStore};
use threatscope_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting threatscope-server (Security Records Analysis)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    config.validate()?;

    // Event store backend: SQLite when a path is configured, memory otherwise
    let store: Arc<dyn RunStore> = match &config.database.path {
        Some(path) => {
            info!("Event store: SQLite at {}", path.display());
            Arc::new(SqliteStore::connect(path).await?)
        }
        None => {
            info!("Event store: in-memory");
            Arc::new(MemoryStore::new())
        }
    };

    let source = Arc::new(FileRecordSource::new(
        config.datasets.hosts_path.clone(),
        config.datasets.certificates_path.clone(),
    ));
    let provider = Arc::new(OpenAiProvider::from_config(&config.provider)?);
    let graph = Arc::new(ExecutionGraph::new(source, provider));

    let state = AppState::new(store, graph);
    let app = threatscope_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app).await?;

    Ok(())
}

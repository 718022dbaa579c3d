//! threatscope-server library interface
//!
//! Exposes the service's components for integration testing: record models
//! and sources, the analysis provider seam, the execution graph, the event
//! sequencer, the run store, and the HTTP router.

pub mod api;
pub mod error;
pub mod graph;
pub mod provider;
pub mod records;
pub mod sequencer;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::graph::ExecutionGraph;
use crate::store::RunStore;

/// Application state shared across handlers
///
/// Everything is an explicitly constructed, reference-counted collaborator;
/// there is no process-wide singleton to swap behind the scenes.
#[derive(Clone)]
pub struct AppState {
    /// Run and event persistence
    pub store: Arc<dyn RunStore>,
    /// The fan-out/fan-in analysis pipeline
    pub graph: Arc<ExecutionGraph>,
}

impl AppState {
    pub fn new(store: Arc<dyn RunStore>, graph: Arc<ExecutionGraph>) -> Self {
        Self { store, graph }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/health", get(api::health_check))
        .route("/v1/stream", post(api::stream_run))
        .route("/v1/runs", get(api::list_runs))
        .route(
            "/v1/runs/:thread_id",
            get(api::get_run).delete(api::delete_run),
        )
        .route("/v1/runs/:thread_id/compact", get(api::get_run_compact))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

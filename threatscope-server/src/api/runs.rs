//! Run retrieval endpoints
//!
//! Lets a UI reload past runs and reconstruct its state from stored events,
//! either raw (every persisted event) or compacted (incomplete chunk
//! sequences folded into synthesized terminal events).

use crate::error::{ApiError, ApiResult};
use crate::store::{EventRecord, RunRecord};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Hard cap on `?limit=`
const MAX_LIST_LIMIT: usize = 200;

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// GET /v1/runs response
#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunRecord>,
    pub total: usize,
}

/// GET /v1/runs/{thread_id} response
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run: RunRecord,
    pub events: Vec<EventRecord>,
}

/// GET /v1/runs - recent runs, most-recently-updated first
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<RunListResponse>> {
    let limit = query.limit.min(MAX_LIST_LIMIT);
    let runs = state.store.list_runs(limit).await?;
    Ok(Json(RunListResponse {
        total: runs.len(),
        runs,
    }))
}

/// GET /v1/runs/{thread_id} - one run with its raw ordered events
pub async fn get_run(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<RunResponse>> {
    let run = state
        .store
        .get_run(&thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", thread_id)))?;
    let events = state.store.list_events(&thread_id).await?;
    Ok(Json(RunResponse { run, events }))
}

/// GET /v1/runs/{thread_id}/compact - one run with compacted events
pub async fn get_run_compact(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<RunResponse>> {
    let run = state
        .store
        .get_run(&thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", thread_id)))?;
    let events = state.store.compact_events(&thread_id).await?;
    Ok(Json(RunResponse { run, events }))
}

/// DELETE /v1/runs/{thread_id} - remove a run and all its events
pub async fn delete_run(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.store.delete_run(&thread_id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("Run {} not found", thread_id)));
    }
    Ok(Json(json!({ "message": format!("Run {} deleted", thread_id) })))
}

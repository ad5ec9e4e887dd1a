use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::super::state::{AppState, TrackedRun};
use crate::error::{AppError, Result};

/// List runs, newest first
pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<TrackedRun>> {
    let mut runs: Vec<TrackedRun> = state.runs.iter().map(|run| run.clone()).collect();
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Json(runs)
}

/// Get a specific run by ID
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<TrackedRun>> {
    state
        .runs
        .get(&run_id)
        .map(|run| Json(run.clone()))
        .ok_or(AppError::RunNotFound(run_id))
}

/// Request cancellation; the run stops before its next step
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let status = state
        .cancel_run(&run_id)
        .ok_or_else(|| AppError::RunNotFound(run_id.clone()))?;

    Ok(Json(serde_json::json!({
        "run_id": run_id,
        "status": status,
        "cancel_requested": true
    })))
}

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::super::state::AppState;
use crate::error::{AppError, Result};
use crate::tools::ActionSummary;

/// List every registered action with its input schema
pub async fn list_actions(State(state): State<Arc<AppState>>) -> Json<Vec<ActionSummary>> {
    Json(
        state
            .runner
            .registry()
            .get_all()
            .into_iter()
            .map(|definition| definition.summary())
            .collect(),
    )
}

pub async fn get_action(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ActionSummary>> {
    state
        .runner
        .registry()
        .get(&name)
        .map(|definition| Json(definition.summary()))
        .ok_or(AppError::ActionNotFound(name))
}

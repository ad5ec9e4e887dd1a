use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::super::state::AppState;
use crate::error::Result;
use crate::playbook::{parser, StepRecord};

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    /// One-line step, e.g. `ios.tap --target "#login_button"`
    pub step: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Run a single shorthand step synchronously
pub async fn run_step(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StepRequest>,
) -> Result<Json<StepRecord>> {
    let step = parser::parse_shorthand(&request.step)?.into_step();
    tracing::debug!("Running single step {}", step.action);

    let record = state
        .runner
        .run_step(&step, request.variables, state.run_options(request.dry_run))
        .await;
    Ok(Json(record))
}

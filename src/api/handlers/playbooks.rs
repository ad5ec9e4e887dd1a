use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::super::state::{AppState, RunState, TrackedRun};
use crate::error::{AppError, Result};
use crate::playbook::{parser, Playbook, PlaybookRunResult};

/// A playbook given inline or by path, plus its run inputs
#[derive(Debug, Deserialize)]
pub struct PlaybookRequest {
    /// Playbook document text (YAML or JSON)
    pub playbook: Option<String>,
    /// Playbook file, relative to the configured working directory
    pub path: Option<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl PlaybookRequest {
    fn load(&self, state: &AppState) -> Result<Playbook> {
        match (&self.playbook, &self.path) {
            (Some(text), _) => Ok(parser::parse(text, None)?),
            (None, Some(path)) => Ok(parser::parse_file(&state.config.cwd.join(path))?),
            (None, None) => Err(AppError::ValidationError(
                "either 'playbook' or 'path' is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub playbook: String,
    pub total_steps: usize,
    pub result: PlaybookRunResult,
}

/// Parse a playbook and dry-run it: templates, conditions, action lookup and
/// input coercion are checked without touching the device
pub async fn validate_playbook(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaybookRequest>,
) -> Result<Json<ValidateResponse>> {
    let playbook = request.load(&state)?;
    let result = state
        .runner
        .run(&playbook, request.inputs, state.run_options(true))
        .await;

    Ok(Json(ValidateResponse {
        valid: result.passed,
        playbook: playbook.name.clone(),
        total_steps: playbook.steps.len(),
        result,
    }))
}

#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: String,
    pub status: RunState,
}

/// Start a playbook run in the background; progress arrives over the WebSocket
pub async fn run_playbook(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaybookRequest>,
) -> Result<Json<StartRunResponse>> {
    let playbook = request.load(&state)?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let run = TrackedRun::new(run_id.clone(), playbook.name.clone());

    let mut options = state.run_options(false);
    options.run_id = Some(run_id.clone());
    options.cancel = Some(run.cancel.clone());
    state.runs.insert(run_id.clone(), run);

    tracing::info!("Starting run {} of playbook '{}'", run_id, playbook.name);

    let task_state = state.clone();
    let task_run_id = run_id.clone();
    let inputs = request.inputs;
    tokio::spawn(async move {
        let result = task_state.runner.run(&playbook, inputs, options).await;
        if let Some(mut run) = task_state.runs.get_mut(&task_run_id) {
            run.finish(result);
        }
        task_state.prune_finished_runs();
    });

    Ok(Json(StartRunResponse {
        run_id,
        status: RunState::Running,
    }))
}

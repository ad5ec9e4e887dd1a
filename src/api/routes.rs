use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers::{actions, health, playbooks, runs, steps};
use super::state::AppState;
use super::websocket::ws_handler;

const ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:1420",
    "http://localhost:5173",
    "http://127.0.0.1:1420",
    "http://127.0.0.1:5173",
];

pub fn create_router(state: Arc<AppState>) -> Router {
    // Local callers only
    let cors = CorsLayer::new()
        .allow_origin(
            ALLOWED_ORIGINS
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Action catalog
        .route("/actions", get(actions::list_actions))
        .route("/actions/:name", get(actions::get_action))
        // Playbooks
        .route("/playbooks/validate", post(playbooks::validate_playbook))
        .route("/playbooks/run", post(playbooks::run_playbook))
        // Runs
        .route("/runs", get(runs::list_runs))
        .route("/runs/:run_id", get(runs::get_run))
        .route("/runs/:run_id/cancel", post(runs::cancel_run))
        // Single shorthand step
        .route("/steps/run", post(steps::run_step))
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

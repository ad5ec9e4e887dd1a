use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::playbook::{PlaybookRunResult, PlaybookRunner, RunEvent, RunOptions};

/// Finished runs kept for `GET /runs`; older ones are evicted
pub const MAX_FINISHED_RUNS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Passed,
    Failed,
    Cancelled,
}

/// A playbook run started through the API
#[derive(Debug, Clone, Serialize)]
pub struct TrackedRun {
    pub run_id: String,
    pub playbook: String,
    pub status: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PlaybookRunResult>,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl TrackedRun {
    pub fn new(run_id: String, playbook: String) -> Self {
        Self {
            run_id,
            playbook,
            status: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn finish(&mut self, result: PlaybookRunResult) {
        self.status = if result.aborted {
            RunState::Cancelled
        } else if result.passed {
            RunState::Passed
        } else {
            RunState::Failed
        };
        self.finished_at = Some(result.completed_at);
        self.result = Some(result);
    }
}

/// Connected WebSocket client info
#[derive(Debug)]
pub struct ConnectedClient {
    pub connected_at: Instant,
}

/// Shared application state
pub struct AppState {
    pub config: Config,

    /// Runner shared by every run; its registry is read-only once built
    pub runner: Arc<PlaybookRunner>,

    /// Runs started through the API: run_id -> run
    pub runs: DashMap<String, TrackedRun>,

    /// Connected WebSocket clients: client_id -> client info
    pub connected_clients: DashMap<String, ConnectedClient>,

    /// Total connection count (for metrics)
    connection_count: AtomicUsize,
}

impl AppState {
    pub fn new(config: Config, runner: Arc<PlaybookRunner>) -> Self {
        Self {
            config,
            runner,
            runs: DashMap::new(),
            connected_clients: DashMap::new(),
            connection_count: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.runner.logger().subscribe()
    }

    /// Options for a run launched with this sidecar's configuration
    pub fn run_options(&self, dry_run: bool) -> RunOptions {
        RunOptions {
            dry_run,
            step_timeout: self.config.step_timeout,
            cwd: self.config.cwd.clone(),
            ..Default::default()
        }
    }

    /// Signal a running playbook to stop before its next step.
    /// Returns `None` for unknown runs.
    pub fn cancel_run(&self, run_id: &str) -> Option<RunState> {
        let run = self.runs.get(run_id)?;
        if run.status == RunState::Running {
            run.cancel.cancel();
            tracing::info!("Cancellation requested for run {}", run_id);
        }
        Some(run.status)
    }

    /// Register a WebSocket client connection
    pub fn client_connected(&self, client_id: &str) {
        self.connected_clients.insert(
            client_id.to_string(),
            ConnectedClient {
                connected_at: Instant::now(),
            },
        );
        let count = self.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "Client {} connected (total: {}, active: {})",
            client_id,
            count,
            self.connected_clients.len()
        );
    }

    pub fn client_disconnected(&self, client_id: &str) {
        if let Some((_, client)) = self.connected_clients.remove(client_id) {
            tracing::debug!(
                "Client {} disconnected after {:?} (active: {})",
                client_id,
                client.connected_at.elapsed(),
                self.connected_clients.len()
            );
        }
    }

    pub fn active_connection_count(&self) -> usize {
        self.connected_clients.len()
    }

    pub fn active_run_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.status == RunState::Running)
            .count()
    }

    /// Evict the oldest finished runs beyond [`MAX_FINISHED_RUNS`].
    /// Running runs are never evicted. Returns how many were removed.
    pub fn prune_finished_runs(&self) -> usize {
        let mut finished: Vec<(DateTime<Utc>, String)> = self
            .runs
            .iter()
            .filter(|run| run.status != RunState::Running)
            .map(|run| (run.finished_at.unwrap_or(run.started_at), run.run_id.clone()))
            .collect();
        if finished.len() <= MAX_FINISHED_RUNS {
            return 0;
        }

        // Newest first; everything past the cap goes
        finished.sort_by(|a, b| b.0.cmp(&a.0));
        let evicted = finished.split_off(MAX_FINISHED_RUNS);
        for (_, run_id) in &evicted {
            self.runs.remove(run_id);
        }
        tracing::debug!("Evicted {} finished run(s)", evicted.len());
        evicted.len()
    }
}

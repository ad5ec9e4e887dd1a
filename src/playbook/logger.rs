use serde::Serialize;
use tokio::sync::broadcast;

use super::models::{PlaybookRunResult, Step, StepRecord, StepStatus};

/// Progress events published while a playbook runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        playbook: String,
        total_steps: usize,
        dry_run: bool,
    },
    StepStarted {
        run_id: String,
        path: String,
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    StepCompleted {
        run_id: String,
        record: StepRecord,
    },
    RunCompleted {
        run_id: String,
        passed: bool,
        aborted: bool,
        total_steps: usize,
        passed_steps: usize,
        failed_steps: usize,
        skipped_steps: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::StepCompleted { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. } => run_id,
        }
    }
}

/// Run logger: structured `tracing` output plus a broadcast of [`RunEvent`]s
#[derive(Clone)]
pub struct RunLogger {
    broadcast: broadcast::Sender<RunEvent>,
}

impl RunLogger {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { broadcast: tx }
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.broadcast.subscribe()
    }

    pub fn debug(&self, run_id: &str, message: impl AsRef<str>) {
        tracing::debug!(run_id, "{}", message.as_ref());
    }

    pub fn info(&self, run_id: &str, message: impl AsRef<str>) {
        tracing::info!(run_id, "{}", message.as_ref());
    }

    pub fn warn(&self, run_id: &str, message: impl AsRef<str>) {
        tracing::warn!(run_id, "{}", message.as_ref());
    }

    pub fn error(&self, run_id: &str, message: impl AsRef<str>) {
        tracing::error!(run_id, "{}", message.as_ref());
    }

    pub fn run_started(&self, run_id: &str, playbook: &str, total_steps: usize, dry_run: bool) {
        self.info(
            run_id,
            format!(
                "Running playbook '{}' ({} steps{})",
                playbook,
                total_steps,
                if dry_run { ", dry run" } else { "" }
            ),
        );
        self.send(RunEvent::RunStarted {
            run_id: run_id.to_string(),
            playbook: playbook.to_string(),
            total_steps,
            dry_run,
        });
    }

    pub fn step_started(&self, run_id: &str, path: &str, step: &Step) {
        self.debug(run_id, format!("Step {} ({}) started", path, step.display_name()));
        self.send(RunEvent::StepStarted {
            run_id: run_id.to_string(),
            path: path.to_string(),
            action: step.action.clone(),
            name: step.name.clone(),
        });
    }

    pub fn step_completed(&self, run_id: &str, record: &StepRecord) {
        let label = record.name.as_deref().unwrap_or(&record.action);
        match (&record.status, &record.error) {
            (StepStatus::Failed, Some(error)) => self.warn(
                run_id,
                format!(
                    "Step {} ({}) failed [{}]: {}",
                    record.path,
                    label,
                    error.kind.as_str(),
                    error.message
                ),
            ),
            (status, _) => self.info(
                run_id,
                format!(
                    "Step {} ({}) {} in {}ms",
                    record.path,
                    label,
                    status.as_str(),
                    record.duration_ms
                ),
            ),
        }
        self.send(RunEvent::StepCompleted {
            run_id: run_id.to_string(),
            record: record.clone(),
        });
    }

    pub fn run_completed(&self, result: &PlaybookRunResult) {
        let message = format!(
            "Playbook '{}' {}: {}",
            result.playbook,
            if result.passed { "passed" } else { "failed" },
            result.summary()
        );
        if result.passed {
            self.info(&result.run_id, message);
        } else {
            self.error(&result.run_id, message);
        }

        self.send(RunEvent::RunCompleted {
            run_id: result.run_id.clone(),
            passed: result.passed,
            aborted: result.aborted,
            total_steps: result.total_steps,
            passed_steps: result.passed_steps,
            failed_steps: result.failed_steps,
            skipped_steps: result.skipped_steps,
            error: result.error.clone(),
        });
    }

    fn send(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.broadcast.send(event);
    }
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new()
    }
}

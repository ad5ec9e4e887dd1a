use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::logger::RunLogger;
use super::models::{
    Playbook, PlaybookRunResult, Step, StepError, StepErrorKind, StepRecord, StepStatus,
};
use super::parser;
use super::template::{evaluate_condition, resolve_inputs, TemplateContext};
use crate::error::PlaybookError;
use crate::tools::{coerce_inputs, ActionContext, ActionError, ActionRegistry};

/// Per-run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Resolve and validate steps without invoking handlers
    pub dry_run: bool,
    /// Budget for each handler invocation
    pub step_timeout: Option<Duration>,
    pub cwd: PathBuf,
    pub session_id: String,
    /// Reuse an id allocated by the caller
    pub run_id: Option<String>,
    /// Checked between steps
    pub cancel: Option<CancellationToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            step_timeout: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            session_id: uuid::Uuid::new_v4().to_string(),
            run_id: None,
            cancel: None,
        }
    }
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|token| token.is_cancelled())
    }
}

/// Mutable state of one run; steps themselves stay immutable
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub inputs: Map<String, Value>,
    pub variables: Map<String, Value>,
    /// Top-level step records, in execution order
    pub records: Vec<StepRecord>,
}

impl ExecutionContext {
    pub fn new(inputs: Map<String, Value>, variables: Map<String, Value>) -> Self {
        Self {
            inputs,
            variables,
            records: Vec::new(),
        }
    }

    pub fn template(&self) -> TemplateContext<'_> {
        TemplateContext {
            inputs: &self.inputs,
            variables: &self.variables,
        }
    }
}

/// Outcome of running one list of sibling steps
struct ListOutcome {
    records: Vec<StepRecord>,
    /// A step failed without `continue_on_error`
    halted: bool,
    /// Index into `records` of the step that halted the list
    halted_at: Option<usize>,
    /// The cancel signal was seen
    aborted: bool,
}

/// Executes playbooks against a shared, read-only action registry
pub struct PlaybookRunner {
    registry: Arc<ActionRegistry>,
    logger: RunLogger,
}

impl PlaybookRunner {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self::with_logger(registry, RunLogger::new())
    }

    pub fn with_logger(registry: Arc<ActionRegistry>, logger: RunLogger) -> Self {
        Self { registry, logger }
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn logger(&self) -> &RunLogger {
        &self.logger
    }

    /// Parse a playbook file and run it
    pub async fn run_file(
        &self,
        path: &Path,
        inputs: Map<String, Value>,
        options: RunOptions,
    ) -> Result<PlaybookRunResult, PlaybookError> {
        let playbook = parser::parse_file(path)?;
        Ok(self.run(&playbook, inputs, options).await)
    }

    /// Run every step of `playbook` in order
    #[instrument(skip_all, fields(playbook = %playbook.name, dry_run = options.dry_run))]
    pub async fn run(
        &self,
        playbook: &Playbook,
        inputs: Map<String, Value>,
        options: RunOptions,
    ) -> PlaybookRunResult {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let started_at = Utc::now();
        let started = Instant::now();

        self.logger
            .run_started(&run_id, &playbook.name, playbook.steps.len(), options.dry_run);

        let mut error = None;
        let mut halted_at = None;
        let mut aborted = false;
        let mut ctx = ExecutionContext::new(Map::new(), playbook.variables.clone());

        match coerce_inputs(&playbook.inputs, inputs) {
            Ok(resolved) => {
                ctx.inputs = resolved;
                let outcome = self
                    .run_list(&playbook.steps, "", &mut ctx, &options, &run_id)
                    .await;
                ctx.records = outcome.records;
                halted_at = outcome.halted_at;
                aborted = outcome.aborted;
            }
            Err(e) => {
                let message = match e {
                    ActionError::Validation(message) => message,
                    other => other.to_string(),
                };
                error = Some(format!("Invalid playbook inputs: {}", message));
                self.logger.error(&run_id, error.as_deref().unwrap_or_default());
                ctx.records = playbook
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| {
                        let mut record =
                            StepRecord::new(i + 1, (i + 1).to_string(), step, StepStatus::Skipped);
                        record.message = Some("Not run: invalid playbook inputs".to_string());
                        record
                    })
                    .collect();
            }
        }

        if aborted {
            error = Some("Run aborted".to_string());
        } else if let Some(index) = halted_at {
            error = ctx.records.get(index).map(failure_summary);
        }

        let count = |status: StepStatus| ctx.records.iter().filter(|r| r.status == status).count();
        let result = PlaybookRunResult {
            run_id,
            playbook: playbook.name.clone(),
            passed: error.is_none(),
            total_steps: playbook.steps.len(),
            passed_steps: count(StepStatus::Passed),
            failed_steps: count(StepStatus::Failed),
            skipped_steps: count(StepStatus::Skipped),
            steps: ctx.records.clone(),
            error,
            aborted,
            dry_run: options.dry_run,
            variables: ctx.variables,
            started_at,
            completed_at: Utc::now(),
            duration_ms: elapsed_ms(started),
        };

        self.logger.run_completed(&result);
        result
    }

    /// Run a single step outside any playbook (no inputs, given variables)
    pub async fn run_step(
        &self,
        step: &Step,
        variables: Map<String, Value>,
        options: RunOptions,
    ) -> StepRecord {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut ctx = ExecutionContext::new(Map::new(), variables);
        self.execute_step(step, 1, "1".to_string(), &mut ctx, &options, &run_id)
            .await
    }

    fn run_list<'a>(
        &'a self,
        steps: &'a [Step],
        prefix: &'a str,
        ctx: &'a mut ExecutionContext,
        options: &'a RunOptions,
        run_id: &'a str,
    ) -> BoxFuture<'a, ListOutcome> {
        async move {
            let mut outcome = ListOutcome {
                records: Vec::with_capacity(steps.len()),
                halted: false,
                halted_at: None,
                aborted: false,
            };

            for (i, step) in steps.iter().enumerate() {
                let index = i + 1;
                let path = if prefix.is_empty() {
                    index.to_string()
                } else {
                    format!("{}.{}", prefix, index)
                };

                if !outcome.aborted && options.is_cancelled() {
                    self.logger.warn(run_id, format!("Abort requested before step {}", path));
                    outcome.aborted = true;
                }

                if outcome.aborted || outcome.halted {
                    let mut record = StepRecord::new(index, path, step, StepStatus::Skipped);
                    if outcome.aborted {
                        record.message = Some("Not run: run aborted".to_string());
                        record.error = Some(StepError::new(StepErrorKind::Aborted, "Run aborted"));
                    } else {
                        record.message = Some("Not run: an earlier step failed".to_string());
                    }
                    self.logger.step_completed(run_id, &record);
                    outcome.records.push(record);
                    continue;
                }

                let record = self
                    .execute_step(step, index, path, ctx, options, run_id)
                    .await;

                if record.is_failed() && !step.continue_on_error {
                    outcome.halted = true;
                    outcome.halted_at = Some(outcome.records.len());
                }
                // Abort seen inside a recovery list ends this list too
                if record
                    .on_failure
                    .iter()
                    .any(|r| r.error.as_ref().is_some_and(|e| e.kind == StepErrorKind::Aborted))
                {
                    outcome.aborted = true;
                }
                outcome.records.push(record);
            }

            outcome
        }
        .boxed()
    }

    /// Run one step, then its `on_failure` steps if it failed
    fn execute_step<'a>(
        &'a self,
        step: &'a Step,
        index: usize,
        path: String,
        ctx: &'a mut ExecutionContext,
        options: &'a RunOptions,
        run_id: &'a str,
    ) -> BoxFuture<'a, StepRecord> {
        async move {
            let started = Instant::now();
            self.logger.step_started(run_id, &path, step);

            let mut record = StepRecord::new(index, path, step, StepStatus::Passed);
            match self.attempt_step(step, &mut record, ctx, options).await {
                Ok(status) => record.status = status,
                Err(error) => {
                    record.status = StepStatus::Failed;
                    record.error = Some(StepError::from(error));
                    record.duration_ms = elapsed_ms(started);

                    if !step.on_failure.is_empty() {
                        let prefix = format!("{}.on_failure", record.path);
                        self.logger.info(
                            run_id,
                            format!(
                                "Running {} on_failure step(s) for step {}",
                                step.on_failure.len(),
                                record.path
                            ),
                        );
                        let recovery = self
                            .run_list(&step.on_failure, &prefix, ctx, options, run_id)
                            .await;
                        record.on_failure = recovery.records;
                    }
                    // Completion carries the recovery records
                    self.logger.step_completed(run_id, &record);
                    return record;
                }
            }

            record.duration_ms = elapsed_ms(started);
            self.logger.step_completed(run_id, &record);
            record
        }
        .boxed()
    }

    /// Condition, templates, lookup, validation, then the handler call
    async fn attempt_step(
        &self,
        step: &Step,
        record: &mut StepRecord,
        ctx: &mut ExecutionContext,
        options: &RunOptions,
    ) -> Result<StepStatus, PlaybookError> {
        if let Some(condition) = &step.condition {
            let holds = evaluate_condition(condition, &ctx.template())
                .map_err(|e| PlaybookError::Validation(format!("condition: {}", e)))?;
            if !holds {
                record.message = Some(format!("Condition not met: {}", condition));
                return Ok(StepStatus::Skipped);
            }
        }

        let raw = resolve_inputs(&step.inputs, &ctx.template())
            .map_err(|e| PlaybookError::Validation(format!("inputs: {}", e)))?;

        let definition = self
            .registry
            .get(&step.action)
            .ok_or_else(|| PlaybookError::UnknownAction(step.action.clone()))?;

        let inputs = definition.validate_inputs(raw)?;
        record.inputs = inputs.clone();

        if options.dry_run {
            record.message = Some("Dry run: handler not invoked".to_string());
            if let Some(name) = &step.store_as {
                ctx.variables.insert(name.clone(), Value::Null);
            }
            return Ok(StepStatus::Passed);
        }

        let outcome = {
            let action_ctx = ActionContext {
                cwd: &options.cwd,
                session_id: &options.session_id,
                variables: &ctx.variables,
            };
            let call = definition.handler.call(inputs, &action_ctx);
            match options.step_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ActionError::Timeout(format!(
                        "{} did not finish within {}ms",
                        step.action,
                        limit.as_millis()
                    ))),
                },
                None => call.await,
            }
        }?;

        if !outcome.success {
            let message = outcome
                .error
                .or(outcome.message)
                .unwrap_or_else(|| format!("{} reported failure", step.action));
            return Err(PlaybookError::ActionExecution(message));
        }

        if let Some(name) = &step.store_as {
            ctx.variables.insert(name.clone(), outcome.stored_value());
        }
        record.output = outcome.data;
        record.message = outcome.message;
        Ok(StepStatus::Passed)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failure_summary(record: &StepRecord) -> String {
    let label = record.name.as_deref().unwrap_or(&record.action);
    match &record.error {
        Some(error) => format!("Step {} ({}) failed: {}", record.path, label, error.message),
        None => format!("Step {} ({}) failed", record.path, label),
    }
}

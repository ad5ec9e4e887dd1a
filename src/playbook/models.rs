use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::tools::InputSpec;

/// Declared playbook input; same shape as an action input
pub type InputDef = InputSpec;

/// A parsed playbook document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputDef>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    pub steps: Vec<Step>,
    /// File the playbook was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// One unit of playbook execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<Step>,
}

impl Step {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.action)
    }
}

/// Result of parsing the one-line step form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShorthandStep {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
}

impl ShorthandStep {
    pub fn into_step(self) -> Step {
        Step {
            action: self.action,
            inputs: self.inputs.unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    Validation,
    UnknownAction,
    ElementNotFound,
    ActionExecution,
    Timeout,
    Aborted,
}

impl StepErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepErrorKind::Validation => "validation",
            StepErrorKind::UnknownAction => "unknown_action",
            StepErrorKind::ElementNotFound => "element_not_found",
            StepErrorKind::ActionExecution => "action_execution",
            StepErrorKind::Timeout => "timeout",
            StepErrorKind::Aborted => "aborted",
        }
    }
}

impl FromStr for StepErrorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(StepErrorKind::Validation),
            "unknown_action" => Ok(StepErrorKind::UnknownAction),
            "element_not_found" => Ok(StepErrorKind::ElementNotFound),
            "action_execution" => Ok(StepErrorKind::ActionExecution),
            "timeout" => Ok(StepErrorKind::Timeout),
            "aborted" => Ok(StepErrorKind::Aborted),
            _ => Err(()),
        }
    }
}

/// Why a step did not pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestions: Vec::new(),
        }
    }
}

/// Log entry for one executed (or skipped) step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in its step list
    pub index: usize,
    /// Location in the playbook, e.g. `2` or `2.on_failure.1`
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub action: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Inputs after template resolution and coercion
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// Records of the recovery steps run after this step failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<StepRecord>,
}

impl StepRecord {
    pub fn new(index: usize, path: String, step: &Step, status: StepStatus) -> Self {
        Self {
            index,
            path,
            name: step.name.clone(),
            action: step.action.clone(),
            status,
            started_at: Utc::now(),
            duration_ms: 0,
            inputs: Map::new(),
            output: None,
            message: None,
            error: None,
            on_failure: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Final report of a playbook run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookRunResult {
    pub run_id: String,
    pub playbook: String,
    pub passed: bool,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Variables as they stood when the run ended
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PlaybookRunResult {
    /// One-line tally, e.g. `3/4 passed, 1 failed, 0 skipped`
    pub fn summary(&self) -> String {
        format!(
            "{}/{} passed, {} failed, {} skipped",
            self.passed_steps, self.total_steps, self.failed_steps, self.skipped_steps
        )
    }

    /// First failed top-level step, if any
    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.is_failed())
    }
}

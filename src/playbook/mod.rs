//! Declarative playbooks: document model, parser, templates and the runner.
//!
//! A playbook is parsed once into an immutable [`Playbook`]; every run gets
//! its own [`ExecutionContext`] holding inputs, variables and step records.

pub mod interpreter;
pub mod logger;
pub mod models;
pub mod parser;
pub mod template;

pub use interpreter::{ExecutionContext, PlaybookRunner, RunOptions};
pub use logger::{RunEvent, RunLogger};
pub use models::{
    InputDef, Playbook, PlaybookRunResult, ShorthandStep, Step, StepError, StepErrorKind,
    StepRecord, StepStatus,
};
pub use parser::{parse, parse_file, parse_shorthand, MAX_ON_FAILURE_DEPTH};
pub use template::{is_truthy, resolve_string, resolve_value, TemplateContext, TemplateError};

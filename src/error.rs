use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::playbook::models::{StepError, StepErrorKind};
use crate::tools::ActionError;

/// Malformed playbook document, optionally tied to the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn with_path(mut self, path: Option<&Path>) -> Self {
        if let Some(path) = path {
            self.path = Some(path.to_path_buf());
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// Engine error taxonomy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybookError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Element {target} not found")]
    ElementNotFound {
        target: String,
        suggestions: Vec<String>,
    },

    #[error("Action failed: {0}")]
    ActionExecution(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Run aborted")]
    Aborted,
}

impl PlaybookError {
    pub fn kind(&self) -> StepErrorKind {
        match self {
            PlaybookError::Parse(_) | PlaybookError::Validation(_) => StepErrorKind::Validation,
            PlaybookError::UnknownAction(_) => StepErrorKind::UnknownAction,
            PlaybookError::ElementNotFound { .. } => StepErrorKind::ElementNotFound,
            PlaybookError::ActionExecution(_) => StepErrorKind::ActionExecution,
            PlaybookError::Timeout(_) => StepErrorKind::Timeout,
            PlaybookError::Aborted => StepErrorKind::Aborted,
        }
    }
}

impl From<ActionError> for PlaybookError {
    fn from(error: ActionError) -> Self {
        match error {
            ActionError::Validation(message) => PlaybookError::Validation(message),
            ActionError::ElementNotFound {
                target,
                suggestions,
            } => PlaybookError::ElementNotFound {
                target,
                suggestions,
            },
            ActionError::Execution(message) => PlaybookError::ActionExecution(message),
            ActionError::Timeout(message) => PlaybookError::Timeout(message),
        }
    }
}

impl From<PlaybookError> for StepError {
    fn from(error: PlaybookError) -> Self {
        let kind = error.kind();
        let message = error.to_string();
        let suggestions = match error {
            PlaybookError::ElementNotFound { suggestions, .. } => suggestions,
            _ => Vec::new(),
        };
        StepError {
            kind,
            message,
            suggestions,
        }
    }
}

/// HTTP-facing error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error("{0}")]
    Playbook(#[from] PlaybookError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ParseError> for AppError {
    fn from(error: ParseError) -> Self {
        AppError::Playbook(PlaybookError::Parse(error))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::RunNotFound(_) | AppError::ActionNotFound(_) => {
                (StatusCode::NOT_FOUND, "Not Found")
            }
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::Playbook(PlaybookError::Parse(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Parse Error")
            }
            AppError::Playbook(PlaybookError::Validation(_))
            | AppError::Playbook(PlaybookError::UnknownAction(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Validation Error")
            }
            AppError::Playbook(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Playbook Error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_includes_path() {
        let error = ParseError::new("Step 2: missing 'action'");
        assert_eq!(error.to_string(), "Step 2: missing 'action'");

        let error = error.with_path(Some(Path::new("flows/login.yaml")));
        assert_eq!(error.to_string(), "flows/login.yaml: Step 2: missing 'action'");
    }

    #[test]
    fn test_action_error_maps_to_step_error() {
        let error: PlaybookError = ActionError::ElementNotFound {
            target: "#login".to_string(),
            suggestions: vec!["#login_button".to_string()],
        }
        .into();
        let step_error = StepError::from(error);
        assert_eq!(step_error.kind, StepErrorKind::ElementNotFound);
        assert_eq!(step_error.suggestions, vec!["#login_button"]);
        assert_eq!(step_error.message, "Element #login not found");
    }

    #[test]
    fn test_status_codes() {
        let response = AppError::RunNotFound("r1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::from(ParseError::new("bad")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::registry::{
    define_action, ActionContext, ActionError, ActionOutcome, ActionRegistry, InputSpec,
    InputType, OutputSpec, RegistryError, TypedAction,
};
use crate::gesture::Clock;

// ============================================================================
// core.log
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LogInputs {
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
}

/// Write a message to the run log
pub struct LogAction;

#[async_trait]
impl TypedAction for LogAction {
    type Inputs = LogInputs;

    async fn run(
        &self,
        inputs: LogInputs,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let session = ctx.session_id;
        match inputs.level.as_deref().unwrap_or("info") {
            "debug" => tracing::debug!(session, "{}", inputs.message),
            "warn" | "warning" => tracing::warn!(session, "{}", inputs.message),
            "error" => tracing::error!(session, "{}", inputs.message),
            "info" => tracing::info!(session, "{}", inputs.message),
            other => {
                return Err(ActionError::Validation(format!(
                    "input 'level': unknown level '{}'",
                    other
                )))
            }
        }
        Ok(ActionOutcome::success(inputs.message))
    }
}

// ============================================================================
// core.wait
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WaitInputs {
    pub ms: f64,
}

/// Pause the run
pub struct WaitAction {
    pub clock: Arc<dyn Clock>,
}

#[async_trait]
impl TypedAction for WaitAction {
    type Inputs = WaitInputs;

    async fn run(
        &self,
        inputs: WaitInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        if !inputs.ms.is_finite() || inputs.ms < 0.0 {
            return Err(ActionError::Validation(format!(
                "input 'ms': expected a non-negative duration, got {}",
                inputs.ms
            )));
        }
        let ms = inputs.ms as u64;
        self.clock.sleep(Duration::from_millis(ms)).await;
        Ok(ActionOutcome::success(format!("Waited {}ms", ms)).with_elapsed(ms))
    }
}

// ============================================================================
// core.set / core.fail
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetInputs {
    pub value: Value,
}

/// Produce a value, usually bound with `store_as`
pub struct SetAction;

#[async_trait]
impl TypedAction for SetAction {
    type Inputs = SetInputs;

    async fn run(
        &self,
        inputs: SetInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        Ok(ActionOutcome::success_with_data("Value set", inputs.value))
    }
}

#[derive(Debug, Deserialize)]
pub struct FailInputs {
    #[serde(default)]
    pub message: Option<String>,
}

/// Fail the step unconditionally
pub struct FailAction;

#[async_trait]
impl TypedAction for FailAction {
    type Inputs = FailInputs;

    async fn run(
        &self,
        inputs: FailInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        Err(ActionError::Execution(
            inputs.message.unwrap_or_else(|| "Step failed".to_string()),
        ))
    }
}

pub fn register_control_actions(
    registry: &mut ActionRegistry,
    clock: Arc<dyn Clock>,
) -> Result<(), RegistryError> {
    registry.register(
        define_action("core.log", "Write a message to the run log", LogAction)
            .input("message", InputSpec::required(InputType::String))
            .input(
                "level",
                InputSpec::optional(InputType::String)
                    .with_default(json!("info"))
                    .describe("debug, info, warn or error"),
            ),
    )?;

    registry.register(
        define_action("core.wait", "Pause for a number of milliseconds", WaitAction { clock })
            .input("ms", InputSpec::required(InputType::Number)),
    )?;

    registry.register(
        define_action("core.set", "Return a value for store_as", SetAction)
            .input("value", InputSpec::required(InputType::Any))
            .output("value", OutputSpec::new(InputType::Any, "The input value")),
    )?;

    registry.register(
        define_action("core.fail", "Fail the step with a message", FailAction)
            .input("message", InputSpec::optional(InputType::String)),
    )?;

    Ok(())
}

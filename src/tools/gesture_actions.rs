//! Gesture actions (`ios.tap`, `ios.scroll_to`, ...) backed by the gesture driver.
//!
//! Target inputs (`target`, `to`, `from`, `in`) all use the same grammar:
//! `#identifier`, `"label"`, `x,y` or a bare identifier.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::registry::{
    define_action, ActionContext, ActionError, ActionOutcome, ActionRegistry, InputSpec,
    InputType, OutputSpec, RegistryError, TypedAction,
};
use crate::device::{Direction, SwipeVelocity, TapKind};
use crate::gesture::{
    parse_target, ActionResult, ActionTarget, FailureKind, GestureDriver, ScrollToOptions,
};

const DEFAULT_LONG_PRESS_MS: f64 = 1000.0;
const DEFAULT_WAIT_TIMEOUT_MS: f64 = 10_000.0;

fn target_input(text: &str, input: &str) -> Result<ActionTarget, ActionError> {
    parse_target(text)
        .ok_or_else(|| ActionError::Validation(format!("input '{}': empty target", input)))
}

fn optional_target(text: Option<&str>, input: &str) -> Result<Option<ActionTarget>, ActionError> {
    text.map(|t| target_input(t, input)).transpose()
}

fn direction_input(text: Option<&str>) -> Result<Option<Direction>, ActionError> {
    text.map(|t| t.parse::<Direction>().map_err(ActionError::Validation))
        .transpose()
}

fn millis(ms: f64) -> Duration {
    Duration::from_millis(ms.max(0.0) as u64)
}

/// Convert a driver result into the handler envelope
fn into_outcome(
    result: ActionResult,
    subject: impl ToString,
) -> Result<ActionOutcome, ActionError> {
    if result.success {
        let message = match (&result.details.matched, &result.warning) {
            (_, Some(warning)) => {
                format!("{} succeeded with warning: {}", result.action_type, warning)
            }
            (Some(matched), None) => format!("{} on {}", result.action_type, matched),
            (None, None) => format!("{} succeeded", result.action_type),
        };
        let data = serde_json::to_value(&result).unwrap_or(Value::Null);
        return Ok(ActionOutcome::success_with_data(message, data).with_elapsed(result.duration_ms));
    }

    let error = result
        .error
        .unwrap_or_else(|| format!("{} failed", result.action_type));
    Err(match result.failure {
        Some(FailureKind::ElementNotFound) => ActionError::ElementNotFound {
            target: subject.to_string(),
            suggestions: result.details.suggestions,
        },
        Some(FailureKind::Timeout) => ActionError::Timeout(error),
        Some(FailureKind::InvalidTarget) => ActionError::Validation(error),
        Some(FailureKind::DeviceRejected) | Some(FailureKind::DeviceError) | None => {
            ActionError::Execution(error)
        }
    })
}

// ============================================================================
// Tap Actions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TapInputs {
    pub target: String,
}

/// Single or double tap on a target
pub struct TapAction {
    pub driver: Arc<GestureDriver>,
    pub kind: TapKind,
}

#[async_trait]
impl TypedAction for TapAction {
    type Inputs = TapInputs;

    async fn run(
        &self,
        inputs: TapInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let target = target_input(&inputs.target, "target")?;
        into_outcome(self.driver.tap(&target, self.kind).await, &target)
    }
}

#[derive(Debug, Deserialize)]
pub struct LongPressInputs {
    pub target: String,
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

pub struct LongPressAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for LongPressAction {
    type Inputs = LongPressInputs;

    async fn run(
        &self,
        inputs: LongPressInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let target = target_input(&inputs.target, "target")?;
        let duration_ms = inputs.duration_ms.unwrap_or(DEFAULT_LONG_PRESS_MS).max(0.0) as u64;
        let result = self
            .driver
            .tap(&target, TapKind::LongPress { duration_ms })
            .await;
        into_outcome(result, &target)
    }
}

// ============================================================================
// Text Input
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TypeInputs {
    pub text: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub clear_first: bool,
}

/// Type text, optionally focusing a field first
pub struct TypeTextAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for TypeTextAction {
    type Inputs = TypeInputs;

    async fn run(
        &self,
        inputs: TypeInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let target = optional_target(inputs.target.as_deref(), "target")?;
        let result = self
            .driver
            .type_text(target.as_ref(), &inputs.text, inputs.clear_first)
            .await;
        let subject = target
            .map(|t| t.to_string())
            .unwrap_or_else(|| "focused element".to_string());
        into_outcome(result, subject)
    }
}

// ============================================================================
// Scroll / Swipe
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ScrollInputs {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    /// Container to scroll inside
    #[serde(default, rename = "in")]
    pub container: Option<String>,
}

pub struct ScrollAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for ScrollAction {
    type Inputs = ScrollInputs;

    async fn run(
        &self,
        inputs: ScrollInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let direction = direction_input(inputs.direction.as_deref())?.unwrap_or_default();
        let container = optional_target(inputs.container.as_deref(), "in")?;
        let result = self
            .driver
            .scroll(direction, inputs.distance, container.as_ref())
            .await;
        let subject = container
            .map(|t| t.to_string())
            .unwrap_or_else(|| "screen".to_string());
        into_outcome(result, subject)
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrollToInputs {
    pub to: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<f64>,
    #[serde(default)]
    pub timeout_ms: Option<f64>,
}

/// Scroll until a target becomes visible
pub struct ScrollToAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for ScrollToAction {
    type Inputs = ScrollToInputs;

    async fn run(
        &self,
        inputs: ScrollToInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let target = target_input(&inputs.to, "to")?;
        let options = ScrollToOptions {
            direction: direction_input(inputs.direction.as_deref())?,
            max_attempts: inputs.max_attempts.map(|n| n.max(0.0) as u32),
            timeout: inputs.timeout_ms.map(millis),
        };
        into_outcome(self.driver.scroll_to(&target, options).await, &target)
    }
}

#[derive(Debug, Deserialize)]
pub struct SwipeInputs {
    pub direction: String,
    #[serde(default)]
    pub velocity: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

pub struct SwipeAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for SwipeAction {
    type Inputs = SwipeInputs;

    async fn run(
        &self,
        inputs: SwipeInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let direction = inputs
            .direction
            .parse::<Direction>()
            .map_err(ActionError::Validation)?;
        let velocity = match inputs.velocity.as_deref() {
            Some(v) => v.parse::<SwipeVelocity>().map_err(ActionError::Validation)?,
            None => SwipeVelocity::default(),
        };
        let from = optional_target(inputs.from.as_deref(), "from")?;
        let result = self.driver.swipe(direction, velocity, from.as_ref()).await;
        let subject = from
            .map(|t| t.to_string())
            .unwrap_or_else(|| "screen".to_string());
        into_outcome(result, subject)
    }
}

// ============================================================================
// Inspection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FindInputs {
    pub query: String,
}

/// Resolve an element query string against the current screen
pub struct FindAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for FindAction {
    type Inputs = FindInputs;

    async fn run(
        &self,
        inputs: FindInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let result = self.driver.find(&inputs.query).await;
        if !result.success {
            return into_outcome(result, &inputs.query);
        }

        let data = result.details.data.clone().unwrap_or_else(|| json!({}));
        let count = data["count"].as_u64().unwrap_or(0);
        let summary = data["summary"].as_str().unwrap_or_default().to_string();
        Ok(ActionOutcome::success_with_data(
            format!("Found {} element(s) for {}\n{}", count, inputs.query, summary),
            data,
        )
        .with_elapsed(result.duration_ms))
    }
}

#[derive(Debug, Deserialize)]
pub struct WaitForInputs {
    pub query: String,
    #[serde(default)]
    pub timeout_ms: Option<f64>,
}

/// Wait until an element query matches
pub struct WaitForAction {
    pub driver: Arc<GestureDriver>,
}

#[async_trait]
impl TypedAction for WaitForAction {
    type Inputs = WaitForInputs;

    async fn run(
        &self,
        inputs: WaitForInputs,
        _ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let timeout = millis(inputs.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));
        into_outcome(self.driver.wait_for(&inputs.query, timeout).await, &inputs.query)
    }
}

/// Register every gesture action against `driver`
pub fn register_gesture_actions(
    registry: &mut ActionRegistry,
    driver: Arc<GestureDriver>,
) -> Result<(), RegistryError> {
    let target = || InputSpec::required(InputType::String).describe("#id, \"label\" or x,y");
    let result = || {
        OutputSpec::new(InputType::Object, "Gesture result with matched element details")
    };

    registry.register(
        define_action(
            "ios.tap",
            "Tap an element or coordinate",
            TapAction {
                driver: driver.clone(),
                kind: TapKind::Single,
            },
        )
        .input("target", target())
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.double_tap",
            "Double tap an element or coordinate",
            TapAction {
                driver: driver.clone(),
                kind: TapKind::Double,
            },
        )
        .input("target", target())
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.long_press",
            "Press and hold an element or coordinate",
            LongPressAction {
                driver: driver.clone(),
            },
        )
        .input("target", target())
        .input(
            "duration_ms",
            InputSpec::optional(InputType::Number)
                .with_default(json!(DEFAULT_LONG_PRESS_MS))
                .describe("Hold duration in milliseconds"),
        )
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.type",
            "Type text, focusing the target first when given",
            TypeTextAction {
                driver: driver.clone(),
            },
        )
        .input("text", InputSpec::required(InputType::String))
        .input(
            "target",
            InputSpec::optional(InputType::String).describe("Field to focus before typing"),
        )
        .input(
            "clear_first",
            InputSpec::optional(InputType::Boolean).with_default(json!(false)),
        )
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.scroll",
            "Scroll once in a direction, optionally inside a container",
            ScrollAction {
                driver: driver.clone(),
            },
        )
        .input(
            "direction",
            InputSpec::optional(InputType::String).with_default(json!("down")),
        )
        .input("distance", InputSpec::optional(InputType::Number))
        .input(
            "in",
            InputSpec::optional(InputType::String).describe("Container to scroll inside"),
        )
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.scroll_to",
            "Scroll until the target is visible, within an attempt and time budget",
            ScrollToAction {
                driver: driver.clone(),
            },
        )
        .input("to", target())
        .input("direction", InputSpec::optional(InputType::String))
        .input("max_attempts", InputSpec::optional(InputType::Number))
        .input("timeout_ms", InputSpec::optional(InputType::Number))
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.swipe",
            "Swipe in a direction, optionally starting on an element",
            SwipeAction {
                driver: driver.clone(),
            },
        )
        .input("direction", InputSpec::required(InputType::String))
        .input(
            "velocity",
            InputSpec::optional(InputType::String).describe("slow, normal or fast"),
        )
        .input("from", InputSpec::optional(InputType::String))
        .output("result", result()),
    )?;

    registry.register(
        define_action(
            "ios.find",
            "Find elements matching a query string",
            FindAction {
                driver: driver.clone(),
            },
        )
        .input(
            "query",
            InputSpec::required(InputType::String)
                .describe("#id, \"label\", Type, Type#id, *text*, comma-separated"),
        )
        .output("count", OutputSpec::new(InputType::Number, "Number of matches"))
        .output("elements", OutputSpec::new(InputType::Array, "Matched elements, position-sorted")),
    )?;

    registry.register(
        define_action("ios.wait_for", "Wait until a query matches", WaitForAction { driver })
            .input("query", InputSpec::required(InputType::String))
            .input(
                "timeout_ms",
                InputSpec::optional(InputType::Number).with_default(json!(DEFAULT_WAIT_TIMEOUT_MS)),
            )
            .output("result", result()),
    )?;

    Ok(())
}

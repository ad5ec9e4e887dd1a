//! Pass-through device commands.
//!
//! These actions do no element resolution. Inputs are forwarded to
//! [`DeviceController::invoke`] as a JSON object, with path inputs resolved
//! against the run's working directory first.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::registry::{
    ActionContext, ActionDefinition, ActionError, ActionHandler, ActionOutcome, ActionRegistry,
    InputSpec, InputType, OutputSpec, RegistryError,
};
use crate::device::serializer::format_tree;
use crate::device::{DeviceController, DeviceResponse};

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn resolve_paths(inputs: &mut Map<String, Value>, keys: &[&str], cwd: &Path) {
    for key in keys {
        if let Some(Value::String(path)) = inputs.get_mut(*key) {
            if Path::new(path.as_str()).is_relative() {
                let resolved = cwd.join(path.as_str()).to_string_lossy().into_owned();
                *path = resolved;
            }
        }
    }
}

fn into_outcome(
    command: &str,
    response: DeviceResponse,
    started: Instant,
) -> Result<ActionOutcome, ActionError> {
    if !response.success {
        let error = response
            .error
            .or(response.message)
            .unwrap_or_else(|| format!("{} was rejected by the device", command));
        return Err(ActionError::Execution(error));
    }

    let mut outcome = ActionOutcome::from(response);
    if outcome.elapsed_ms == 0 {
        outcome.elapsed_ms = elapsed_ms(started);
    }
    Ok(outcome)
}

/// Forward a named command to the device
pub struct DeviceCommandAction {
    pub device: Arc<dyn DeviceController>,
    pub command: &'static str,
    /// Inputs holding filesystem paths
    pub path_inputs: &'static [&'static str],
}

#[async_trait]
impl ActionHandler for DeviceCommandAction {
    async fn call(
        &self,
        mut inputs: Map<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let started = Instant::now();
        resolve_paths(&mut inputs, self.path_inputs, ctx.cwd);
        inputs.insert("session_id".to_string(), json!(ctx.session_id));

        tracing::debug!("Invoking device command {}", self.command);
        let response = self
            .device
            .invoke(self.command, &Value::Object(inputs))
            .await
            .map_err(|e| ActionError::Execution(format!("{}: {}", self.command, e)))?;

        into_outcome(self.command, response, started)
    }
}

/// Capture the accessibility tree along with the device's own state report
pub struct SnapshotAction {
    pub device: Arc<dyn DeviceController>,
}

#[async_trait]
impl ActionHandler for SnapshotAction {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let started = Instant::now();

        let tree = self
            .device
            .snapshot()
            .await
            .map_err(|e| ActionError::Execution(format!("snapshot: {}", e)))?;

        let mut params = inputs;
        params.insert("session_id".to_string(), json!(ctx.session_id));
        let response = self
            .device
            .invoke("snapshot", &Value::Object(params))
            .await
            .map_err(|e| ActionError::Execution(format!("snapshot: {}", e)))?;
        let mut outcome = into_outcome("snapshot", response, started)?;

        let report = outcome.data.take().unwrap_or(Value::Null);
        let node_count = tree.node_count();
        outcome.data = Some(json!({
            "node_count": node_count,
            "outline": format_tree(&tree),
            "tree": serde_json::to_value(&tree).unwrap_or(Value::Null),
            "report": report,
        }));
        outcome.message = Some(format!("Captured snapshot with {} element(s)", node_count));
        Ok(outcome)
    }
}

fn command(
    device: &Arc<dyn DeviceController>,
    name: &'static str,
    path_inputs: &'static [&'static str],
) -> Arc<dyn ActionHandler> {
    Arc::new(DeviceCommandAction {
        device: device.clone(),
        command: name,
        path_inputs,
    })
}

/// Register the pass-through device commands
pub fn register_device_actions(
    registry: &mut ActionRegistry,
    device: Arc<dyn DeviceController>,
) -> Result<(), RegistryError> {
    let device_id = || InputSpec::optional(InputType::String).describe("Simulator UDID or name");

    registry.register(
        ActionDefinition::new("ios.boot", "Boot a simulator", command(&device, "boot", &[]))
            .input("device", device_id()),
    )?;

    registry.register(
        ActionDefinition::new(
            "ios.erase",
            "Erase all content and settings",
            command(&device, "erase", &[]),
        )
        .input("device", device_id()),
    )?;

    registry.register(
        ActionDefinition::new(
            "ios.install",
            "Install an app bundle",
            command(&device, "install", &["app_path"]),
        )
        .input(
            "app_path",
            InputSpec::required(InputType::String).describe("Path to the .app bundle"),
        )
        .input("device", device_id()),
    )?;

    registry.register(
        ActionDefinition::new(
            "ios.launch",
            "Launch an installed app",
            command(&device, "launch", &[]),
        )
            .input("bundle_id", InputSpec::required(InputType::String))
            .input(
                "args",
                InputSpec::optional(InputType::Array).describe("Launch arguments"),
            )
            .input("device", device_id()),
    )?;

    registry.register(
        ActionDefinition::new(
            "ios.screenshot",
            "Capture a screenshot",
            command(&device, "screenshot", &["path"]),
        )
        .input(
            "path",
            InputSpec::optional(InputType::String).describe("Destination file"),
        )
        .output(
            "path",
            OutputSpec::new(InputType::String, "Where the screenshot was written"),
        ),
    )?;

    registry.register(
        ActionDefinition::new(
            "ios.snapshot",
            "Capture the accessibility tree and device state",
            Arc::new(SnapshotAction {
                device: device.clone(),
            }),
        )
        .input(
            "include_crash",
            InputSpec::optional(InputType::Boolean)
                .with_default(json!(false))
                .describe("Attach recent crash reports"),
        )
        .input(
            "log_duration",
            InputSpec::optional(InputType::Number).describe("Seconds of log to attach"),
        )
        .output("tree", OutputSpec::new(InputType::Object, "Accessibility tree"))
        .output("node_count", OutputSpec::new(InputType::Number, "Elements in the tree")),
    )?;

    registry.register(
        ActionDefinition::new("ios.logs", "Collect device logs", command(&device, "logs", &[]))
            .input(
                "duration",
                InputSpec::optional(InputType::Number)
                    .with_default(json!(5))
                    .describe("Seconds of log to collect"),
            )
            .input("filter", InputSpec::optional(InputType::String))
            .output("lines", OutputSpec::new(InputType::Array, "Log lines")),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RecordedGesture, ReplayDevice, UIElement};
    use std::path::PathBuf;

    async fn call(
        registry: &ActionRegistry,
        name: &str,
        inputs: Value,
    ) -> Result<ActionOutcome, ActionError> {
        let definition = registry.get(name).unwrap();
        let inputs = definition.validate_inputs(inputs.as_object().cloned().unwrap_or_default())?;
        let cwd = PathBuf::from("/work");
        let variables = Map::new();
        let ctx = ActionContext {
            cwd: &cwd,
            session_id: "sess",
            variables: &variables,
        };
        definition.handler.call(inputs, &ctx).await
    }

    #[tokio::test]
    async fn test_install_resolves_relative_path() {
        let device = Arc::new(ReplayDevice::new(UIElement::new("Application")));
        let mut registry = ActionRegistry::new();
        register_device_actions(&mut registry, device.clone()).unwrap();

        let outcome = call(&registry, "ios.install", json!({"app_path": "build/App.app"}))
            .await
            .unwrap();
        assert!(outcome.success);

        match &device.gestures().await[0] {
            RecordedGesture::Command { command, params } => {
                assert_eq!(command, "install");
                assert_eq!(params["app_path"], "/work/build/App.app");
                assert_eq!(params["session_id"], "sess");
            }
            other => panic!("unexpected gesture {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_command_is_execution_error() {
        let device = Arc::new(ReplayDevice::new(UIElement::new("Application")).rejecting("boot"));
        let mut registry = ActionRegistry::new();
        register_device_actions(&mut registry, device).unwrap();

        let err = call(&registry, "ios.boot", json!({})).await.unwrap_err();
        assert_eq!(err, ActionError::Execution("Device rejected boot".to_string()));
    }

    #[tokio::test]
    async fn test_snapshot_coerces_flags_and_attaches_tree() {
        let tree = UIElement::new("Application").with_child(UIElement::new("Button"));
        let device = Arc::new(ReplayDevice::new(tree));
        let mut registry = ActionRegistry::new();
        register_device_actions(&mut registry, device.clone()).unwrap();

        let outcome = call(
            &registry,
            "ios.snapshot",
            json!({"include_crash": true, "log_duration": "120"}),
        )
        .await
        .unwrap();
        let data = outcome.data.unwrap();
        assert_eq!(data["node_count"], 2);

        match &device.gestures().await[0] {
            RecordedGesture::Command { params, .. } => {
                assert_eq!(params["include_crash"], true);
                assert_eq!(params["log_duration"], 120);
            }
            other => panic!("unexpected gesture {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_required_input_is_rejected_before_device() {
        let device = Arc::new(ReplayDevice::new(UIElement::new("Application")));
        let mut registry = ActionRegistry::new();
        register_device_actions(&mut registry, device.clone()).unwrap();

        let err = call(&registry, "ios.launch", json!({})).await.unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert!(device.gestures().await.is_empty());
    }
}

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use crate::device::DeviceResponse;

/// Declared type of an action or playbook input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    String,
    #[serde(alias = "integer", alias = "int", alias = "float")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::String => "string",
            InputType::Number => "number",
            InputType::Boolean => "boolean",
            InputType::Object => "object",
            InputType::Array => "array",
            InputType::Any => "any",
        }
    }

    /// Convert `value` to this type where the conversion is lossless.
    ///
    /// Strings coerce to numbers and booleans, numbers and booleans coerce
    /// to strings; everything else must already have the declared shape.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (InputType::Any, value) => Ok(value),

            (InputType::String, Value::String(s)) => Ok(Value::String(s)),
            (InputType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (InputType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

            (InputType::Number, Value::Number(n)) => Ok(Value::Number(n)),
            (InputType::Number, Value::String(s)) => {
                parse_number(&s).ok_or_else(|| format!("expected number, got \"{}\"", s))
            }

            (InputType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (InputType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("expected boolean, got \"{}\"", s)),
            },

            (InputType::Object, Value::Object(o)) => Ok(Value::Object(o)),
            (InputType::Array, Value::Array(a)) => Ok(Value::Array(a)),

            (expected, other) => Err(format!(
                "expected {}, got {}",
                expected.as_str(),
                value_kind(&other)
            )),
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema for one input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type", default)]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputSpec {
    pub fn required(input_type: InputType) -> Self {
        Self {
            input_type,
            required: true,
            ..Default::default()
        }
    }

    pub fn optional(input_type: InputType) -> Self {
        Self {
            input_type,
            ..Default::default()
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type", default)]
    pub output_type: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OutputSpec {
    pub fn new(output_type: InputType, description: impl Into<String>) -> Self {
        Self {
            output_type,
            description: Some(description.into()),
        }
    }
}

/// Apply defaults and coerce `raw` against `specs`.
///
/// Null values count as missing. Inputs without a spec pass through
/// untouched. All problems are reported together.
pub fn coerce_inputs(
    specs: &BTreeMap<String, InputSpec>,
    mut raw: Map<String, Value>,
) -> Result<Map<String, Value>, ActionError> {
    let mut resolved = Map::new();
    let mut problems = Vec::new();

    for (name, spec) in specs {
        match raw.remove(name).filter(|v| !v.is_null()) {
            Some(value) => match spec.input_type.coerce(value) {
                Ok(value) => {
                    resolved.insert(name.clone(), value);
                }
                Err(reason) => problems.push(format!("input '{}': {}", name, reason)),
            },
            None => match &spec.default {
                Some(default) => {
                    resolved.insert(name.clone(), default.clone());
                }
                None if spec.required => {
                    problems.push(format!("missing required input '{}'", name));
                }
                None => {}
            },
        }
    }

    resolved.extend(raw);

    if problems.is_empty() {
        Ok(resolved)
    } else {
        Err(ActionError::Validation(problems.join("; ")))
    }
}

/// Context handed to every handler invocation
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub cwd: &'a Path,
    pub session_id: &'a str,
    /// Read-only view of the run's variables; writes happen through `store_as`
    pub variables: &'a Map<String, Value>,
}

/// Envelope returned by a handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn success_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Value bound by `store_as`: `data` when present, else the envelope
    pub fn stored_value(&self) -> Value {
        match &self.data {
            Some(data) => data.clone(),
            None => serde_json::json!({
                "success": self.success,
                "message": self.message,
                "elapsed_ms": self.elapsed_ms,
            }),
        }
    }
}

impl From<DeviceResponse> for ActionOutcome {
    fn from(response: DeviceResponse) -> Self {
        Self {
            success: response.success,
            data: response.data,
            message: response.message,
            error: response.error,
            elapsed_ms: response.elapsed_ms,
        }
    }
}

/// Handler-level failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Element {target} not found")]
    ElementNotFound {
        target: String,
        suggestions: Vec<String>,
    },

    #[error("{0}")]
    Execution(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Untyped handler boundary: inputs arrive already coerced against the
/// definition's input specs
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Handler with a statically known input shape, see [`define_action`]
#[async_trait]
pub trait TypedAction: Send + Sync + 'static {
    type Inputs: DeserializeOwned + Send;

    async fn run(
        &self,
        inputs: Self::Inputs,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError>;
}

struct Typed<A: TypedAction> {
    action: A,
    _inputs: PhantomData<fn() -> A::Inputs>,
}

#[async_trait]
impl<A: TypedAction> ActionHandler for Typed<A> {
    async fn call(
        &self,
        inputs: Map<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        let inputs: A::Inputs = serde_json::from_value(Value::Object(inputs))
            .map_err(|e| ActionError::Validation(e.to_string()))?;
        self.action.run(inputs, ctx).await
    }
}

/// A registered action
#[derive(Clone)]
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    pub inputs: BTreeMap<String, InputSpec>,
    pub outputs: BTreeMap<String, OutputSpec>,
    pub handler: Arc<dyn ActionHandler>,
}

impl ActionDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            handler,
        }
    }

    pub fn input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
        self.inputs.insert(name.into(), spec);
        self
    }

    pub fn output(mut self, name: impl Into<String>, spec: OutputSpec) -> Self {
        self.outputs.insert(name.into(), spec);
        self
    }

    pub fn validate_inputs(
        &self,
        raw: Map<String, Value>,
    ) -> Result<Map<String, Value>, ActionError> {
        coerce_inputs(&self.inputs, raw)
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a definition, without the handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSummary {
    pub name: String,
    pub description: String,
    pub inputs: BTreeMap<String, InputSpec>,
    pub outputs: BTreeMap<String, OutputSpec>,
}

/// Build a definition whose handler receives `A::Inputs` instead of a raw map.
/// Nothing is registered.
pub fn define_action<A: TypedAction>(
    name: impl Into<String>,
    description: impl Into<String>,
    action: A,
) -> ActionDefinition {
    ActionDefinition::new(
        name,
        description,
        Arc::new(Typed {
            action,
            _inputs: PhantomData,
        }),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Action '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Catalog of actions, keyed by namespaced name.
///
/// Built at startup and then shared read-only (behind an `Arc`) by every run.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionDefinition>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action; an existing registration under the same name is
    /// left untouched
    pub fn register(&mut self, definition: ActionDefinition) -> Result<(), RegistryError> {
        if self.actions.contains_key(&definition.name) {
            return Err(RegistryError::AlreadyRegistered(definition.name));
        }
        tracing::debug!("Registered action {}", definition.name);
        self.actions.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every definition, sorted by name
    pub fn get_all(&self) -> Vec<&ActionDefinition> {
        let mut all: Vec<&ActionDefinition> = self.actions.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn call(
            &self,
            inputs: Map<String, Value>,
            _ctx: &ActionContext<'_>,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::success_with_data("echo", Value::Object(inputs)))
        }
    }

    #[derive(Deserialize)]
    struct GreetInputs {
        name: String,
        #[serde(default)]
        times: Option<f64>,
    }

    struct Greet;

    #[async_trait]
    impl TypedAction for Greet {
        type Inputs = GreetInputs;

        async fn run(
            &self,
            inputs: GreetInputs,
            ctx: &ActionContext<'_>,
        ) -> Result<ActionOutcome, ActionError> {
            let times = inputs.times.unwrap_or(1.0) as usize;
            Ok(ActionOutcome::success(format!(
                "{} from {}",
                vec![format!("hi {}", inputs.name); times].join(", "),
                ctx.session_id
            )))
        }
    }

    fn echo(name: &str) -> ActionDefinition {
        ActionDefinition::new(name, "echo inputs", Arc::new(Echo))
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut registry = ActionRegistry::new();
        registry.register(echo("core.echo")).unwrap();

        let second = ActionDefinition::new("core.echo", "replacement", Arc::new(Echo));
        let err = registry.register(second).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("core.echo".to_string()));
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.get("core.echo").unwrap().description, "echo inputs");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_get_all_and_clear() {
        let mut registry = ActionRegistry::new();
        registry.register(echo("ios.tap")).unwrap();
        registry.register(echo("core.log")).unwrap();

        assert!(registry.has("ios.tap"));
        assert!(!registry.has("ios.swipe"));
        assert_eq!(registry.list(), vec!["core.log", "ios.tap"]);
        assert_eq!(registry.get_all()[0].name, "core.log");

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("ios.tap").is_none());
    }

    #[test]
    fn test_coercion_rules() {
        assert_eq!(InputType::Number.coerce(json!("120")), Ok(json!(120)));
        assert_eq!(InputType::Number.coerce(json!("1.5")), Ok(json!(1.5)));
        assert_eq!(InputType::Boolean.coerce(json!("TRUE")), Ok(json!(true)));
        assert_eq!(InputType::String.coerce(json!(42)), Ok(json!("42")));
        assert_eq!(InputType::String.coerce(json!(false)), Ok(json!("false")));
        assert!(InputType::Number.coerce(json!("abc")).is_err());
        assert!(InputType::Object.coerce(json!([1])).is_err());
        assert_eq!(InputType::Any.coerce(json!([1])), Ok(json!([1])));
    }

    #[test]
    fn test_coerce_inputs_defaults_required_and_passthrough() {
        let mut specs = BTreeMap::new();
        specs.insert("count".to_string(), InputSpec::required(InputType::Number));
        specs.insert(
            "verbose".to_string(),
            InputSpec::optional(InputType::Boolean).with_default(json!(false)),
        );

        let raw = json!({"count": "3", "extra": "kept"});
        let resolved = coerce_inputs(&specs, raw.as_object().unwrap().clone()).unwrap();
        assert_eq!(Value::Object(resolved), json!({"count": 3, "verbose": false, "extra": "kept"}));

        let err = coerce_inputs(&specs, Map::new()).unwrap_err();
        assert_eq!(
            err,
            ActionError::Validation("missing required input 'count'".to_string())
        );
    }

    #[tokio::test]
    async fn test_define_action_deserializes_typed_inputs() {
        let definition = define_action("core.greet", "say hi", Greet)
            .input("name", InputSpec::required(InputType::String))
            .input("times", InputSpec::optional(InputType::Number));

        let cwd = PathBuf::from(".");
        let variables = Map::new();
        let ctx = ActionContext {
            cwd: &cwd,
            session_id: "s1",
            variables: &variables,
        };

        let inputs = definition
            .validate_inputs(json!({"name": "ada", "times": "2"}).as_object().unwrap().clone())
            .unwrap();
        let outcome = definition.handler.call(inputs, &ctx).await.unwrap();
        assert_eq!(outcome.message.as_deref(), Some("hi ada, hi ada from s1"));

        let err = definition.handler.call(Map::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[test]
    fn test_stored_value_prefers_data() {
        let with_data = ActionOutcome::success_with_data("ok", json!({"id": 7}));
        assert_eq!(with_data.stored_value(), json!({"id": 7}));

        let bare = ActionOutcome::success("done").with_elapsed(12);
        assert_eq!(
            bare.stored_value(),
            json!({"success": true, "message": "done", "elapsed_ms": 12})
        );
    }
}

//! `{{ expr }}` interpolation over the run's inputs and variables.
//!
//! Expressions are paths only: a root (`inputs` or `variables`) followed by
//! `.key` and `[index]` segments, optionally negated with a leading `!`.
//! A missing path evaluates to `null`.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Unterminated '{{{{' in \"{0}\"")]
    Unterminated(String),

    #[error("Empty expression in \"{0}\"")]
    Empty(String),

    #[error("Invalid expression \"{expr}\": {reason}")]
    InvalidPath { expr: String, reason: String },

    #[error("Unknown root '{0}' (expected 'inputs' or 'variables')")]
    UnknownRoot(String),
}

/// Read-only view templates are evaluated against
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub inputs: &'a Map<String, Value>,
    pub variables: &'a Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn interpolation() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{(.*?)\}\}").expect("interpolation pattern is a valid regex")
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn parse_path(expr: &str) -> Result<Vec<Segment>, TemplateError> {
    let invalid = |reason: &str| TemplateError::InvalidPath {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut chars = expr.chars().peekable();
    let mut key = String::new();

    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        key.push(c);
        chars.next();
    }
    if key.is_empty() {
        return Err(invalid("expected a name"));
    }
    segments.push(Segment::Key(std::mem::take(&mut key)));

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                while let Some(&c) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(invalid("expected a name after '.'"));
                }
                segments.push(Segment::Key(std::mem::take(&mut key)));
            }
            '[' => {
                let mut digits = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    digits.push(c);
                }
                if !closed {
                    return Err(invalid("unterminated '['"));
                }
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                segments.push(Segment::Index(index));
            }
            other => return Err(invalid(&format!("unexpected character '{}'", other))),
        }
    }

    Ok(segments)
}

fn lookup<'v>(root: &'v Map<String, Value>, segments: &[Segment]) -> Option<&'v Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = match first {
        Segment::Key(key) => root.get(key)?,
        Segment::Index(_) => return None,
    };

    for segment in rest {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluate one expression (the text between the braces)
pub fn evaluate(expr: &str, ctx: &TemplateContext<'_>) -> Result<Value, TemplateError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(TemplateError::Empty(expr.to_string()));
    }

    if let Some(inner) = expr.strip_prefix('!') {
        let value = evaluate(inner, ctx)?;
        return Ok(Value::Bool(!is_truthy(&value)));
    }

    let segments = parse_path(expr)?;
    let root = match &segments[0] {
        Segment::Key(key) if key == "inputs" => ctx.inputs,
        Segment::Key(key) if key == "variables" => ctx.variables,
        Segment::Key(key) => return Err(TemplateError::UnknownRoot(key.clone())),
        Segment::Index(_) => return Err(TemplateError::UnknownRoot(expr.to_string())),
    };

    if segments.len() == 1 {
        return Ok(Value::Object(root.clone()));
    }
    Ok(lookup(root, &segments[1..]).cloned().unwrap_or(Value::Null))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve a string template.
///
/// A string that is exactly one `{{ expr }}` keeps the value's native type;
/// otherwise every interpolation is stringified in place.
pub fn resolve_string(template: &str, ctx: &TemplateContext<'_>) -> Result<Value, TemplateError> {
    if !template.contains("{{") {
        return Ok(Value::String(template.to_string()));
    }

    let pattern = interpolation();
    let trimmed = template.trim();
    if let Some(caps) = pattern.captures(trimmed) {
        if caps.get(0).map(|m| m.as_str().len()) == Some(trimmed.len()) {
            return evaluate(&caps[1], ctx);
        }
    }

    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    for caps in pattern.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        output.push_str(&template[last..whole.start()]);
        output.push_str(&stringify(&evaluate(&caps[1], ctx)?));
        last = whole.end();
    }
    let tail = &template[last..];
    if tail.contains("{{") {
        return Err(TemplateError::Unterminated(template.to_string()));
    }
    output.push_str(tail);

    Ok(Value::String(output))
}

/// Resolve templates anywhere inside a value
pub fn resolve_value(value: &Value, ctx: &TemplateContext<'_>) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, ctx)?)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Resolve every value of a step's input map
pub fn resolve_inputs(
    inputs: &Map<String, Value>,
    ctx: &TemplateContext<'_>,
) -> Result<Map<String, Value>, TemplateError> {
    inputs
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, ctx)?)))
        .collect()
}

/// `null`, `false`, `0` and `""` are falsy; everything else is truthy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Resolve a step condition and test it
pub fn evaluate_condition(
    condition: &str,
    ctx: &TemplateContext<'_>,
) -> Result<bool, TemplateError> {
    resolve_string(condition, ctx).map(|value| is_truthy(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn maps() -> (Map<String, Value>, Map<String, Value>) {
        let inputs = json!({"email": "ada@example.com", "count": 3, "debug": false});
        let variables = json!({
            "login": {"success": true, "items": [{"id": "a"}, {"id": "b"}]},
            "empty": ""
        });
        (
            inputs.as_object().unwrap().clone(),
            variables.as_object().unwrap().clone(),
        )
    }

    #[test]
    fn test_whole_expression_keeps_native_type() {
        let (inputs, variables) = maps();
        let ctx = TemplateContext {
            inputs: &inputs,
            variables: &variables,
        };

        assert_eq!(resolve_string("{{ inputs.count }}", &ctx).unwrap(), json!(3));
        assert_eq!(resolve_string("  {{inputs.debug}} ", &ctx).unwrap(), json!(false));
        assert_eq!(
            resolve_string("{{ variables.login.items[1] }}", &ctx).unwrap(),
            json!({"id": "b"})
        );
        assert_eq!(
            resolve_string("{{ variables.login.items.0.id }}", &ctx).unwrap(),
            json!("a")
        );
    }

    #[test]
    fn test_mixed_text_is_stringified() {
        let (inputs, variables) = maps();
        let ctx = TemplateContext {
            inputs: &inputs,
            variables: &variables,
        };

        assert_eq!(
            resolve_string("user {{ inputs.email }} x{{ inputs.count }}", &ctx).unwrap(),
            json!("user ada@example.com x3")
        );
        assert_eq!(
            resolve_string("[{{ variables.missing }}]", &ctx).unwrap(),
            json!("[]")
        );
        assert_eq!(resolve_string("plain", &ctx).unwrap(), json!("plain"));
    }

    #[test]
    fn test_missing_paths_are_null_and_bad_roots_fail() {
        let (inputs, variables) = maps();
        let ctx = TemplateContext {
            inputs: &inputs,
            variables: &variables,
        };

        assert_eq!(evaluate("variables.nope.deeper", &ctx).unwrap(), Value::Null);
        assert_eq!(
            evaluate("secrets.token", &ctx).unwrap_err(),
            TemplateError::UnknownRoot("secrets".to_string())
        );
        assert!(matches!(
            evaluate("inputs..email", &ctx),
            Err(TemplateError::InvalidPath { .. })
        ));
        assert!(matches!(
            evaluate("inputs.a[1", &ctx),
            Err(TemplateError::InvalidPath { .. })
        ));
        assert!(matches!(
            resolve_string("{{ }}", &ctx),
            Err(TemplateError::Empty(_))
        ));
        assert!(matches!(
            resolve_string("a {{ inputs.email", &ctx),
            Err(TemplateError::Unterminated(_))
        ));
    }

    #[test]
    fn test_conditions_and_truthiness() {
        let (inputs, variables) = maps();
        let ctx = TemplateContext {
            inputs: &inputs,
            variables: &variables,
        };

        assert!(evaluate_condition("{{ variables.login.success }}", &ctx).unwrap());
        assert!(!evaluate_condition("{{ inputs.debug }}", &ctx).unwrap());
        assert!(evaluate_condition("{{ !inputs.debug }}", &ctx).unwrap());
        assert!(!evaluate_condition("{{ variables.empty }}", &ctx).unwrap());
        assert!(!evaluate_condition("{{ variables.missing }}", &ctx).unwrap());

        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("false")));
    }

    #[test]
    fn test_resolve_value_recurses() {
        let (inputs, variables) = maps();
        let ctx = TemplateContext {
            inputs: &inputs,
            variables: &variables,
        };

        let value = json!({"to": "{{ inputs.email }}", "list": ["{{ inputs.count }}", 1]});
        assert_eq!(
            resolve_value(&value, &ctx).unwrap(),
            json!({"to": "ada@example.com", "list": [3, 1]})
        );
    }
}

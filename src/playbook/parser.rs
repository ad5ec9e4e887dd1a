use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use super::models::{InputDef, Playbook, ShorthandStep, Step};
use crate::error::ParseError;

/// Deepest allowed `on_failure` nesting
pub const MAX_ON_FAILURE_DEPTH: usize = 8;

/// Parse a playbook document (YAML, or JSON as a YAML subset).
///
/// `path` is only used to label errors.
pub fn parse(text: &str, path: Option<&Path>) -> Result<Playbook, ParseError> {
    parse_document(text)
        .map(|mut playbook| {
            playbook.source = path.map(Path::to_path_buf);
            playbook
        })
        .map_err(|e| e.with_path(path))
}

/// Read and parse a playbook file
pub fn parse_file(path: &Path) -> Result<Playbook, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ParseError::new(format!("Failed to read playbook: {}", e)).with_path(Some(path))
    })?;
    parse(&text, Some(path))
}

fn parse_document(text: &str) -> Result<Playbook, ParseError> {
    let document: Value = serde_yaml::from_str(text)
        .map_err(|e| ParseError::new(format!("Invalid playbook syntax: {}", e)))?;

    let Value::Object(mut root) = document else {
        return Err(ParseError::new("Playbook must be a mapping"));
    };

    let name = match root.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        Some(Value::String(_)) => return Err(ParseError::new("Field 'name' must not be empty")),
        Some(_) => return Err(ParseError::new("Field 'name' must be a string")),
        None => return Err(ParseError::new("Missing required field 'name'")),
    };

    let description = match root.remove("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(description)) => Some(description),
        Some(_) => return Err(ParseError::new("Field 'description' must be a string")),
    };

    let inputs = match root.remove("inputs") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(inputs)) => parse_input_defs(inputs)?,
        Some(_) => return Err(ParseError::new("Field 'inputs' must be a mapping")),
    };

    let variables = match root.remove("variables") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(variables)) => variables,
        Some(_) => return Err(ParseError::new("Field 'variables' must be a mapping")),
    };

    let steps = match root.remove("steps") {
        None | Some(Value::Null) => return Err(ParseError::new("Missing required field 'steps'")),
        Some(Value::Array(steps)) if steps.is_empty() => {
            return Err(ParseError::new("Field 'steps' must not be empty"))
        }
        Some(Value::Array(steps)) => parse_steps(steps, "", 0)?,
        Some(_) => return Err(ParseError::new("Field 'steps' must be a list")),
    };

    for key in root.keys() {
        tracing::debug!("Ignoring unknown playbook field '{}'", key);
    }

    Ok(Playbook {
        name,
        description,
        inputs,
        variables,
        steps,
        source: None,
    })
}

fn parse_input_defs(inputs: Map<String, Value>) -> Result<BTreeMap<String, InputDef>, ParseError> {
    inputs
        .into_iter()
        .map(|(name, value)| {
            let def = match value {
                Value::Null => InputDef::default(),
                Value::Object(_) => serde_json::from_value(value)
                    .map_err(|e| ParseError::new(format!("Input '{}': {}", name, e)))?,
                _ => {
                    return Err(ParseError::new(format!(
                        "Input '{}' must be a mapping with 'type', 'required' and 'default'",
                        name
                    )))
                }
            };
            Ok((name, def))
        })
        .collect()
}

/// `label` is the enclosing step's label ("" at the top level)
fn parse_steps(steps: Vec<Value>, label: &str, depth: usize) -> Result<Vec<Step>, ParseError> {
    if depth > MAX_ON_FAILURE_DEPTH {
        return Err(ParseError::new(format!(
            "{}: on_failure nested deeper than {} levels",
            label, MAX_ON_FAILURE_DEPTH
        )));
    }

    steps
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let step_label = if label.is_empty() {
                format!("Step {}", i + 1)
            } else {
                format!("{} on_failure step {}", label, i + 1)
            };
            parse_step(value, &step_label, depth)
        })
        .collect()
}

fn parse_step(value: Value, label: &str, depth: usize) -> Result<Step, ParseError> {
    let Value::Object(mut fields) = value else {
        return Err(ParseError::new(format!("{}: step must be a mapping", label)));
    };
    let invalid = |field: &str, expected: &str| {
        ParseError::new(format!("{}: field '{}' must be {}", label, field, expected))
    };

    let action = match fields.remove("action") {
        Some(Value::String(action)) if !action.trim().is_empty() => action.trim().to_string(),
        _ => {
            return Err(ParseError::new(format!(
                "{}: missing required string field 'action'",
                label
            )))
        }
    };

    let name = match fields.remove("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name),
        Some(_) => return Err(invalid("name", "a string")),
    };

    let store_as = match fields.remove("store_as") {
        None | Some(Value::Null) => None,
        Some(Value::String(store_as)) if !store_as.trim().is_empty() => {
            Some(store_as.trim().to_string())
        }
        Some(_) => return Err(invalid("store_as", "a non-empty string")),
    };

    let condition = match fields.remove("condition") {
        None | Some(Value::Null) => None,
        Some(Value::String(condition)) => Some(condition),
        Some(_) => return Err(invalid("condition", "a string")),
    };

    let continue_on_error = match fields.remove("continue_on_error") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(_) => return Err(invalid("continue_on_error", "a boolean")),
    };

    let inputs = match fields.remove("inputs") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(inputs)) => inputs,
        Some(_) => return Err(invalid("inputs", "a mapping")),
    };

    let on_failure = match fields.remove("on_failure") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(steps)) => parse_steps(steps, label, depth + 1)?,
        Some(_) => return Err(invalid("on_failure", "a list of steps")),
    };

    for key in fields.keys() {
        tracing::debug!("{}: ignoring unknown field '{}'", label, key);
    }

    Ok(Step {
        name,
        action,
        inputs,
        store_as,
        condition,
        continue_on_error,
        on_failure,
    })
}

// ============================================================================
// Shorthand
// ============================================================================

struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_flag(&self) -> bool {
        !self.quoted && self.text.starts_with("--")
    }
}

/// Split on whitespace, keeping quoted runs together and dropping the quotes
fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                quoted = true;
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    in_token = false;
                    quoted = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(ParseError::new(format!("Unterminated {} quote in shorthand step", q)));
    }
    if in_token {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    Ok(tokens)
}

/// Parse `<action> [--flag] [--key value] [--key "quoted value"]`.
///
/// Flags without a value are `true`; values stay strings (the action's input
/// specs coerce them). Dashes in keys become underscores.
pub fn parse_shorthand(text: &str) -> Result<ShorthandStep, ParseError> {
    let mut tokens = tokenize(text)?.into_iter().peekable();

    let action = match tokens.next() {
        None => return Err(ParseError::new("Shorthand step is empty")),
        Some(token) if token.is_flag() => {
            return Err(ParseError::new(format!(
                "Shorthand step must start with an action name, got '{}'",
                token.text
            )))
        }
        Some(token) if token.text.is_empty() => {
            return Err(ParseError::new("Shorthand step has an empty action name"))
        }
        Some(token) => token.text,
    };

    let mut inputs = Map::new();
    while let Some(token) = tokens.next() {
        if !token.is_flag() {
            tracing::debug!("Ignoring positional token '{}' in shorthand step", token.text);
            continue;
        }

        let flag = &token.text[2..];
        let (key, inline) = match flag.split_once('=') {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (flag, None),
        };
        if key.is_empty() {
            tracing::debug!("Ignoring bare '--' in shorthand step");
            continue;
        }
        let key = key.replace('-', "_");

        let value = match inline {
            Some(value) => Value::String(value),
            None => match tokens.next_if(|next| !next.is_flag()) {
                Some(next) => Value::String(next.text),
                None => Value::Bool(true),
            },
        };
        inputs.insert(key, value);
    }

    Ok(ShorthandStep {
        action,
        inputs: (!inputs.is_empty()).then_some(inputs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::InputType;
    use serde_json::json;

    #[test]
    fn test_minimal_document() {
        let playbook = parse("name: smoke\nsteps:\n  - action: core.log\n", None).unwrap();
        assert_eq!(playbook.name, "smoke");
        assert_eq!(playbook.steps.len(), 1);
        assert_eq!(playbook.steps[0].action, "core.log");
    }

    #[test]
    fn test_full_document() {
        let text = r##"
name: login
description: Log in and land on the feed
inputs:
  email: { type: string, required: true }
  retries: { type: number, default: 2 }
variables:
  attempts: 0
steps:
  - name: Tap login
    action: ios.tap
    inputs:
      target: "#login_button"
    store_as: tap_result
    condition: "{{ inputs.email }}"
    continue_on_error: true
    on_failure:
      - action: ios.screenshot
        inputs: { path: failure.png }
"##;
        let playbook = parse(text, Some(Path::new("login.yaml"))).unwrap();
        assert_eq!(playbook.source.as_deref(), Some(Path::new("login.yaml")));
        assert_eq!(playbook.inputs["email"].input_type, InputType::String);
        assert!(playbook.inputs["email"].required);
        assert_eq!(playbook.inputs["retries"].default, Some(json!(2)));
        assert_eq!(playbook.variables["attempts"], 0);

        let step = &playbook.steps[0];
        assert_eq!(step.display_name(), "Tap login");
        assert_eq!(step.inputs["target"], "#login_button");
        assert_eq!(step.store_as.as_deref(), Some("tap_result"));
        assert!(step.continue_on_error);
        assert_eq!(step.on_failure[0].action, "ios.screenshot");
    }

    #[test]
    fn test_missing_name_and_steps() {
        let err = parse("steps:\n  - action: core.log\n", None).unwrap_err();
        assert!(err.message.contains("'name'"), "{}", err);

        let err = parse("name: x\n", None).unwrap_err();
        assert!(err.message.contains("'steps'"), "{}", err);

        let err = parse("name: x\nsteps: []\n", None).unwrap_err();
        assert!(err.message.contains("must not be empty"), "{}", err);
    }

    #[test]
    fn test_step_errors_name_the_step_index() {
        let err = parse(
            "name: x\nsteps:\n  - action: core.log\n  - name: second\n",
            None,
        )
        .unwrap_err();
        assert_eq!(err.message, "Step 2: missing required string field 'action'");

        let err = parse(
            "name: x\nsteps:\n  - action: core.log\n    continue_on_error: \"yes\"\n",
            None,
        )
        .unwrap_err();
        assert_eq!(err.message, "Step 1: field 'continue_on_error' must be a boolean");

        let err = parse(
            "name: x\nsteps:\n  - action: a\n    on_failure:\n      - action: b\n      - inputs: {}\n",
            None,
        )
        .unwrap_err();
        assert!(err.message.starts_with("Step 1 on_failure step 2"), "{}", err);

        for (field, bad) in [
            ("name", "[1]"),
            ("store_as", "{}"),
            ("condition", "3"),
            ("inputs", "[]"),
            ("on_failure", "x"),
        ] {
            let text = format!("name: x\nsteps:\n  - action: a\n    {}: {}\n", field, bad);
            let err = parse(&text, None).unwrap_err();
            assert!(err.message.contains(field), "{}: {}", field, err);
            assert!(err.message.starts_with("Step 1"), "{}", err);
        }
    }

    #[test]
    fn test_error_carries_path() {
        let err = parse("name: [", Some(Path::new("broken.yaml"))).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(Path::new("broken.yaml")));
        assert!(err.to_string().starts_with("broken.yaml: Invalid playbook syntax"));
    }

    #[test]
    fn test_on_failure_depth_cap() {
        let mut text = String::from("name: deep\nsteps:\n");
        let mut indent = String::from("  ");
        for _ in 0..=MAX_ON_FAILURE_DEPTH + 1 {
            text.push_str(&format!("{}- action: core.log\n{}  on_failure:\n", indent, indent));
            indent.push_str("    ");
        }
        text.push_str(&format!("{}- action: core.log\n", indent));

        let err = parse(&text, None).unwrap_err();
        assert!(err.message.contains("nested deeper"), "{}", err);
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.message.starts_with("Failed to read playbook"));
    }

    #[test]
    fn test_shorthand_flags_and_values() {
        let step = parse_shorthand("ios.snapshot --include-crash --log-duration 120").unwrap();
        assert_eq!(step.action, "ios.snapshot");
        assert_eq!(
            Value::Object(step.inputs.unwrap()),
            json!({"include_crash": true, "log_duration": "120"})
        );
    }

    #[test]
    fn test_shorthand_quotes_and_inline_values() {
        let text = r#"ios.scroll_to --to "Privacy & Security" --direction=up --in '#settings_list'"#;
        let step = parse_shorthand(text).unwrap();
        assert_eq!(
            Value::Object(step.inputs.unwrap()),
            json!({"to": "Privacy & Security", "direction": "up", "in": "#settings_list"})
        );

        // A quoted value that looks like a flag is still a value
        let step = parse_shorthand(r#"core.log --message "--verbose""#).unwrap();
        assert_eq!(step.inputs.unwrap()["message"], "--verbose");
    }

    #[test]
    fn test_shorthand_without_inputs_and_errors() {
        let step = parse_shorthand("  ios.boot  ").unwrap();
        assert_eq!(step.action, "ios.boot");
        assert!(step.inputs.is_none());

        assert!(parse_shorthand("   ").is_err());
        assert!(parse_shorthand("--flag").is_err());
        assert!(parse_shorthand("core.log --message \"open").is_err());
    }

    #[test]
    fn test_shorthand_trailing_flag_and_positional() {
        let step = parse_shorthand("ios.tap stray --target #ok --force").unwrap();
        assert_eq!(
            Value::Object(step.inputs.unwrap()),
            json!({"target": "#ok", "force": true})
        );
    }
}

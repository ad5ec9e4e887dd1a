use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::device::query::{strip_matching_quotes, ElementQuery};
use crate::device::types::Point;

/// Where a gesture should land
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionTarget {
    Identifier(String),
    Label(String),
    Coordinates { x: f64, y: f64 },
}

impl ActionTarget {
    /// Element lookup for this target; `None` for raw coordinates
    pub fn to_query(&self) -> Option<ElementQuery> {
        match self {
            ActionTarget::Identifier(id) => Some(ElementQuery::by_identifier(id.clone())),
            ActionTarget::Label(label) => Some(ElementQuery::by_label(label.clone())),
            ActionTarget::Coordinates { .. } => None,
        }
    }

    pub fn point(&self) -> Option<Point> {
        match self {
            ActionTarget::Coordinates { x, y } => Some(Point::new(*x, *y)),
            _ => None,
        }
    }

    /// The raw text used when looking for similar elements
    pub fn needle(&self) -> Option<&str> {
        match self {
            ActionTarget::Identifier(s) | ActionTarget::Label(s) => Some(s),
            ActionTarget::Coordinates { .. } => None,
        }
    }
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::Identifier(id) => write!(f, "#{}", id),
            ActionTarget::Label(label) => write!(f, "\"{}\"", label),
            ActionTarget::Coordinates { x, y } => write!(f, "({}, {})", x, y),
        }
    }
}

fn coordinate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(-?(?:\d+(?:\.\d+)?|\.\d+))\s*,\s*(-?(?:\d+(?:\.\d+)?|\.\d+))$")
            .expect("coordinate pattern is a valid regex")
    })
}

/// Parse target text shared by every gesture entry point (`--from`, `--to`,
/// `--in`, tap targets).
///
/// In priority order: `#id`, `"label"` / `'label'`, `x,y`, then any other
/// non-empty text as a lenient identifier. Returns `None` for empty input,
/// a bare `#`, or empty quotes.
pub fn parse_target(text: &str) -> Option<ActionTarget> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(id) = text.strip_prefix('#') {
        let id = id.trim();
        return (!id.is_empty()).then(|| ActionTarget::Identifier(id.to_string()));
    }

    if let Some(inner) = strip_matching_quotes(text) {
        return (!inner.is_empty()).then(|| ActionTarget::Label(inner.to_string()));
    }

    if let Some(caps) = coordinate_pattern().captures(text) {
        let x = caps[1].parse::<f64>().ok()?;
        let y = caps[2].parse::<f64>().ok()?;
        return Some(ActionTarget::Coordinates { x, y });
    }

    Some(ActionTarget::Identifier(text.to_string()))
}

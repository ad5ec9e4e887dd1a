use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Bounding rectangle for UI elements, in screen points
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A screen location in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One node of an accessibility snapshot.
///
/// Trees are produced by an external inspector and never mutated afterwards;
/// the query layer only ever borrows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    /// Control type tag: Button, TextField, ScrollView, Cell, etc.
    #[serde(rename = "type")]
    pub element_type: String,
    /// Accessibility identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Accessibility label (usually the displayed text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Current value (text fields, switches, sliders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub frame: Frame,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub traits: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UIElement>,
}

fn default_true() -> bool {
    true
}

impl UIElement {
    /// Create an enabled, visible element with no attributes
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            identifier: None,
            label: None,
            value: None,
            placeholder: None,
            frame: Frame::default(),
            enabled: true,
            visible: true,
            traits: BTreeSet::new(),
            children: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_frame(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.frame = Frame::new(x, y, width, height);
        self
    }

    pub fn with_trait(mut self, name: impl Into<String>) -> Self {
        self.traits.insert(name.into());
        self
    }

    pub fn with_child(mut self, child: UIElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Best human-facing name for this element
    pub fn display_text(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.identifier.clone())
            .or_else(|| self.value.clone())
            .or_else(|| self.placeholder.clone())
            .unwrap_or_else(|| self.element_type.clone())
    }

    /// Depth-first, pre-order walk over this element and all descendants
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    /// Number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

/// Pre-order iterator over a snapshot tree
pub struct PreOrder<'a> {
    stack: Vec<&'a UIElement>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a UIElement;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Gesture direction for scroll and swipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(format!(
                "Invalid direction '{}' (expected up, down, left or right)",
                other
            )),
        }
    }
}

/// Swipe speed hint passed through to the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeVelocity {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl SwipeVelocity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeVelocity::Slow => "slow",
            SwipeVelocity::Normal => "normal",
            SwipeVelocity::Fast => "fast",
        }
    }
}

impl FromStr for SwipeVelocity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(SwipeVelocity::Slow),
            "normal" => Ok(SwipeVelocity::Normal),
            "fast" => Ok(SwipeVelocity::Fast),
            other => Err(format!(
                "Invalid velocity '{}' (expected slow, normal or fast)",
                other
            )),
        }
    }
}

/// Kind of tap sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TapKind {
    Single,
    Double,
    LongPress { duration_ms: u64 },
}

impl TapKind {
    pub fn action_type(&self) -> &'static str {
        match self {
            TapKind::Single => "tap",
            TapKind::Double => "double_tap",
            TapKind::LongPress { .. } => "long_press",
        }
    }
}

/// A single scroll gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollGesture {
    pub direction: Direction,
    /// Distance in points; the device picks its own default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Where to anchor the gesture (center of a container element)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Point>,
}

/// A single swipe gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeGesture {
    pub direction: Direction,
    pub velocity: SwipeVelocity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Point>,
}

/// Response envelope returned by every device-level command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
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

impl DeviceResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_center() {
        let frame = Frame::new(100.0, 200.0, 50.0, 30.0);
        assert_eq!(frame.center(), Point::new(125.0, 215.0));
        assert!(frame.contains(Point::new(110.0, 210.0)));
        assert!(!frame.contains(Point::new(10.0, 10.0)));
    }

    #[test]
    fn test_pre_order_walk() {
        let tree = UIElement::new("Window")
            .with_identifier("root")
            .with_child(
                UIElement::new("Other")
                    .with_identifier("a")
                    .with_child(UIElement::new("Button").with_identifier("a1")),
            )
            .with_child(UIElement::new("Button").with_identifier("b"));

        let order: Vec<_> = tree
            .iter()
            .map(|e| e.identifier.clone().unwrap_or_default())
            .collect();
        assert_eq!(order, vec!["root", "a", "a1", "b"]);
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_element_deserializes_with_defaults() {
        let json = r#"{
            "type": "Button",
            "identifier": "login_button",
            "frame": {"x": 10, "y": 20, "width": 100, "height": 44},
            "traits": ["button"]
        }"#;
        let element: UIElement = serde_json::from_str(json).unwrap();
        assert_eq!(element.element_type, "Button");
        assert!(element.enabled);
        assert!(element.visible);
        assert!(element.traits.contains("button"));
        assert!(element.children.is_empty());
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Up);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!("fast".parse::<SwipeVelocity>().unwrap(), SwipeVelocity::Fast);
    }
}

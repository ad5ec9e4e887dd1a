use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::controller::DeviceController;
use super::types::{DeviceResponse, Point, ScrollGesture, SwipeGesture, TapKind, UIElement};
use crate::gesture::clock::Clock;

/// A gesture or command received by a [`ReplayDevice`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordedGesture {
    Tap { point: Point, kind: TapKind },
    Type { text: String, clear_first: bool },
    Scroll(ScrollGesture),
    Swipe(SwipeGesture),
    Command { command: String, params: Value },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Sequence(Vec<UIElement>),
    Single(UIElement),
}

/// Device that replays a recorded sequence of UI snapshots.
///
/// Each scroll or swipe advances to the next snapshot (the last one sticks),
/// which is enough to exercise locate/retry loops offline. Every gesture is
/// recorded for later inspection.
pub struct ReplayDevice {
    snapshots: Vec<UIElement>,
    cursor: Mutex<usize>,
    gestures: Mutex<Vec<RecordedGesture>>,
    rejected: HashSet<String>,
    latency: Option<(Arc<dyn Clock>, Duration)>,
}

impl ReplayDevice {
    /// Serve a single, never-changing snapshot
    pub fn new(snapshot: UIElement) -> Self {
        Self::with_snapshots(vec![snapshot])
    }

    /// Serve snapshots in order, advancing one per scroll/swipe
    pub fn with_snapshots(snapshots: Vec<UIElement>) -> Self {
        let snapshots = if snapshots.is_empty() {
            vec![UIElement::new("Application")]
        } else {
            snapshots
        };

        Self {
            snapshots,
            cursor: Mutex::new(0),
            gestures: Mutex::new(Vec::new()),
            rejected: HashSet::new(),
            latency: None,
        }
    }

    /// Load one tree or an array of trees from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot file {}", path.display()))?;
        let parsed: SnapshotFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file {}", path.display()))?;

        Ok(match parsed {
            SnapshotFile::Sequence(trees) => Self::with_snapshots(trees),
            SnapshotFile::Single(tree) => Self::new(tree),
        })
    }

    /// Make the device reject a gesture kind (`tap`, `type_text`, `scroll`,
    /// `swipe`) or a named command
    pub fn rejecting(mut self, command: impl Into<String>) -> Self {
        self.rejected.insert(command.into());
        self
    }

    /// Charge `latency` to `clock` for every scroll and swipe
    pub fn with_latency(mut self, clock: Arc<dyn Clock>, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    /// Gestures received so far, in order
    pub async fn gestures(&self) -> Vec<RecordedGesture> {
        self.gestures.lock().await.clone()
    }

    /// Number of scroll gestures received
    pub async fn scroll_count(&self) -> usize {
        self.gestures
            .lock()
            .await
            .iter()
            .filter(|g| matches!(g, RecordedGesture::Scroll(_)))
            .count()
    }

    async fn record(&self, gesture: RecordedGesture) {
        self.gestures.lock().await.push(gesture);
    }

    async fn advance(&self) {
        if let Some((clock, latency)) = &self.latency {
            clock.sleep(*latency).await;
        }
        let mut cursor = self.cursor.lock().await;
        if *cursor + 1 < self.snapshots.len() {
            *cursor += 1;
        }
    }

    fn check(&self, name: &str) -> Option<DeviceResponse> {
        self.rejected
            .contains(name)
            .then(|| DeviceResponse::rejected(format!("Device rejected {}", name)))
    }
}

#[async_trait]
impl DeviceController for ReplayDevice {
    async fn snapshot(&self) -> Result<UIElement> {
        let cursor = *self.cursor.lock().await;
        self.snapshots
            .get(cursor)
            .cloned()
            .ok_or_else(|| anyhow!("No snapshot at position {}", cursor))
    }

    async fn tap(&self, point: Point, kind: TapKind) -> Result<DeviceResponse> {
        self.record(RecordedGesture::Tap { point, kind }).await;
        if let Some(rejection) = self.check("tap") {
            return Ok(rejection);
        }
        Ok(DeviceResponse::ok(format!(
            "{} at ({}, {})",
            kind.action_type(),
            point.x,
            point.y
        )))
    }

    async fn type_text(&self, text: &str, clear_first: bool) -> Result<DeviceResponse> {
        self.record(RecordedGesture::Type {
            text: text.to_string(),
            clear_first,
        })
        .await;
        if let Some(rejection) = self.check("type_text") {
            return Ok(rejection);
        }
        Ok(DeviceResponse::ok(format!("Typed {} characters", text.chars().count())))
    }

    async fn scroll(&self, gesture: &ScrollGesture) -> Result<DeviceResponse> {
        self.record(RecordedGesture::Scroll(gesture.clone())).await;
        if let Some(rejection) = self.check("scroll") {
            return Ok(rejection);
        }
        self.advance().await;
        Ok(DeviceResponse::ok(format!("Scrolled {}", gesture.direction.as_str())))
    }

    async fn swipe(&self, gesture: &SwipeGesture) -> Result<DeviceResponse> {
        self.record(RecordedGesture::Swipe(gesture.clone())).await;
        if let Some(rejection) = self.check("swipe") {
            return Ok(rejection);
        }
        self.advance().await;
        Ok(DeviceResponse::ok(format!(
            "Swiped {} ({})",
            gesture.direction.as_str(),
            gesture.velocity.as_str()
        )))
    }

    async fn invoke(&self, command: &str, params: &Value) -> Result<DeviceResponse> {
        self.record(RecordedGesture::Command {
            command: command.to_string(),
            params: params.clone(),
        })
        .await;
        if let Some(rejection) = self.check(command) {
            return Ok(rejection);
        }
        Ok(DeviceResponse::ok_with_data(
            format!("{} completed", command),
            json!({ "command": command, "params": params }),
        ))
    }
}

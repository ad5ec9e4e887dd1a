use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::types::{DeviceResponse, Point, ScrollGesture, SwipeGesture, TapKind, UIElement};

/// Device-control collaborator.
///
/// Abstracts the simulator/device transport behind a common interface. An
/// `Err` means the command never reached the device (transport failure);
/// a `DeviceResponse` with `success: false` means the device rejected it.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Capture the current accessibility tree
    async fn snapshot(&self) -> Result<UIElement>;

    /// Tap, double tap or long press at a screen point
    async fn tap(&self, point: Point, kind: TapKind) -> Result<DeviceResponse>;

    /// Type into the focused element, optionally clearing it first
    async fn type_text(&self, text: &str, clear_first: bool) -> Result<DeviceResponse>;

    /// Perform one scroll gesture
    async fn scroll(&self, gesture: &ScrollGesture) -> Result<DeviceResponse>;

    /// Perform one swipe gesture
    async fn swipe(&self, gesture: &SwipeGesture) -> Result<DeviceResponse>;

    /// Run an opaque device command (boot, erase, install, screenshot, logs, ...)
    async fn invoke(&self, command: &str, params: &Value) -> Result<DeviceResponse>;
}

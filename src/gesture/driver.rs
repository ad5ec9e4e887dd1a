//! Gesture execution against a live device.
//!
//! Every invocation walks the same phases:
//! `Resolving -> Locating -> (Found -> Acting -> Verifying -> Done) | (NotFound -> Failed)`.
//! Direct gestures look the target up once; `scroll_to` and `wait_for` retry
//! under an attempt budget and a wall-clock budget, both checked before each
//! device call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::clock::{Clock, TokioClock};
use super::target::ActionTarget;
use crate::device::query::{find_by_query_string, find_elements, suggest_similar, ElementQuery};
use crate::device::serializer::format_element;
use crate::device::{
    DeviceController, DeviceResponse, Direction, ScrollGesture, SwipeGesture, SwipeVelocity,
    TapKind, UIElement,
};

const DEFAULT_SCROLL_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_SCROLL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SETTLE_MS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Budgets and pacing for the gesture driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Most scroll gestures a single scroll-to may perform
    pub scroll_max_attempts: u32,
    /// Wall-clock budget for scroll-to
    pub scroll_timeout: Duration,
    /// Pause after a scroll before taking the next snapshot
    pub settle_delay: Duration,
    /// Pause between polls in wait-for
    pub poll_interval: Duration,
    /// Most similar elements reported when a target is missing
    pub suggestion_limit: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scroll_max_attempts: DEFAULT_SCROLL_MAX_ATTEMPTS,
            scroll_timeout: Duration::from_millis(DEFAULT_SCROLL_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Why a gesture failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Target text could not be used for this gesture
    InvalidTarget,
    /// Lookup (or the whole retry budget) found nothing
    ElementNotFound,
    /// Wall-clock budget ran out
    Timeout,
    /// The device answered but refused the command
    DeviceRejected,
    /// The command never reached the device
    DeviceError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDetails {
    /// Summary of the element acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    /// Nearby identifiers/labels when the target was not found
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    /// Gestures or polls spent inside a retry loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outcome of one gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub status: ActionStatus,
    pub action_type: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Non-fatal issue, e.g. the target was disabled or hidden
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub details: ActionDetails,
}

/// Options for [`GestureDriver::scroll_to`]
#[derive(Debug, Clone, Default)]
pub struct ScrollToOptions {
    pub direction: Option<Direction>,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Where a located target lives
struct Located {
    point: crate::device::Point,
    element: Option<UIElement>,
}

enum Lookup {
    Found(Located),
    NotFound { suggestions: Vec<String> },
}

/// In-flight bookkeeping for one invocation
struct Attempt {
    action_type: &'static str,
    started: Instant,
    details: ActionDetails,
    warning: Option<String>,
}

impl Attempt {
    fn located(&mut self, located: &Located) {
        if let Some(ref element) = located.element {
            self.details.matched = Some(format_element(element));
            self.warning = state_warning(element);
        }
    }
}

/// Executes gestures against a [`DeviceController`]
pub struct GestureDriver {
    device: Arc<dyn DeviceController>,
    clock: Arc<dyn Clock>,
    config: DriverConfig,
}

impl GestureDriver {
    pub fn new(device: Arc<dyn DeviceController>) -> Self {
        Self::with_clock(device, Arc::new(TokioClock), DriverConfig::default())
    }

    pub fn with_clock(
        device: Arc<dyn DeviceController>,
        clock: Arc<dyn Clock>,
        config: DriverConfig,
    ) -> Self {
        Self {
            device,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn DeviceController> {
        &self.device
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Tap, double tap or long press a target
    pub async fn tap(&self, target: &ActionTarget, kind: TapKind) -> ActionResult {
        let mut attempt = self.begin(kind.action_type());
        tracing::debug!("{} {}: resolving", attempt.action_type, target);

        let located = match self.locate_once(target).await {
            Ok(Lookup::Found(located)) => located,
            Ok(Lookup::NotFound { suggestions }) => {
                attempt.details.suggestions = suggestions;
                return self.fail(attempt, FailureKind::ElementNotFound, not_found(target));
            }
            Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
        };
        attempt.located(&located);

        tracing::debug!(
            "{}: acting at ({}, {})",
            attempt.action_type,
            located.point.x,
            located.point.y
        );
        let response = self.device.tap(located.point, kind).await;
        self.verify(attempt, response)
    }

    /// Type text, focusing `target` first when given
    pub async fn type_text(
        &self,
        target: Option<&ActionTarget>,
        text: &str,
        clear_first: bool,
    ) -> ActionResult {
        let mut attempt = self.begin("type_text");

        if let Some(target) = target {
            let located = match self.locate_once(target).await {
                Ok(Lookup::Found(located)) => located,
                Ok(Lookup::NotFound { suggestions }) => {
                    attempt.details.suggestions = suggestions;
                    return self.fail(attempt, FailureKind::ElementNotFound, not_found(target));
                }
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            };
            attempt.located(&located);

            match self.device.tap(located.point, TapKind::Single).await {
                Ok(response) if response.success => {}
                Ok(response) => {
                    let error = response
                        .error
                        .unwrap_or_else(|| "Device rejected focus tap".to_string());
                    return self.fail(attempt, FailureKind::DeviceRejected, error);
                }
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            }
        }

        let response = self.device.type_text(text, clear_first).await;
        self.verify(attempt, response)
    }

    /// One scroll gesture, optionally anchored inside a container
    pub async fn scroll(
        &self,
        direction: Direction,
        distance: Option<f64>,
        container: Option<&ActionTarget>,
    ) -> ActionResult {
        let mut attempt = self.begin("scroll");

        let anchor = match container {
            Some(target) => match self.locate_once(target).await {
                Ok(Lookup::Found(located)) => {
                    attempt.located(&located);
                    Some(located.point)
                }
                Ok(Lookup::NotFound { suggestions }) => {
                    attempt.details.suggestions = suggestions;
                    return self.fail(attempt, FailureKind::ElementNotFound, not_found(target));
                }
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            },
            None => None,
        };

        let gesture = ScrollGesture {
            direction,
            distance,
            anchor,
        };
        let response = self.device.scroll(&gesture).await;
        self.verify(attempt, response)
    }

    /// One swipe gesture, optionally starting on a target
    pub async fn swipe(
        &self,
        direction: Direction,
        velocity: SwipeVelocity,
        from: Option<&ActionTarget>,
    ) -> ActionResult {
        let mut attempt = self.begin("swipe");

        let from = match from {
            Some(target) => match self.locate_once(target).await {
                Ok(Lookup::Found(located)) => {
                    attempt.located(&located);
                    Some(located.point)
                }
                Ok(Lookup::NotFound { suggestions }) => {
                    attempt.details.suggestions = suggestions;
                    return self.fail(attempt, FailureKind::ElementNotFound, not_found(target));
                }
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            },
            None => None,
        };

        let gesture = SwipeGesture {
            direction,
            velocity,
            from,
        };
        let response = self.device.swipe(&gesture).await;
        self.verify(attempt, response)
    }

    /// Scroll until `target` is visible.
    ///
    /// Performs at most `max_attempts` scroll gestures and stops early once
    /// the wall-clock budget is spent.
    pub async fn scroll_to(&self, target: &ActionTarget, options: ScrollToOptions) -> ActionResult {
        let mut attempt = self.begin("scroll_to");

        let Some(query) = target.to_query() else {
            return self.fail(
                attempt,
                FailureKind::InvalidTarget,
                format!("scroll-to needs an element target, got {}", target),
            );
        };
        let query = query.visible_only();

        let direction = options.direction.unwrap_or_default();
        let max_attempts = options.max_attempts.unwrap_or(self.config.scroll_max_attempts);
        let timeout = options.timeout.unwrap_or(self.config.scroll_timeout);
        let mut gestures: u32 = 0;

        loop {
            let tree = match self.device.snapshot().await {
                Ok(tree) => tree,
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            };

            if let Some(element) = find_elements(&tree, &query).first_by_position() {
                tracing::debug!("scroll_to {}: found after {} gesture(s)", target, gestures);
                attempt.details.matched = Some(format_element(element));
                attempt.details.attempts = Some(gestures);
                attempt.warning = state_warning(element);
                return self.succeed(attempt);
            }

            attempt.details.attempts = Some(gestures);

            if gestures >= max_attempts {
                attempt.details.suggestions = self.suggestions(&tree, target);
                return self.fail(
                    attempt,
                    FailureKind::ElementNotFound,
                    format!(
                        "Element {} not visible after {} scroll(s) {}",
                        target,
                        gestures,
                        direction.as_str()
                    ),
                );
            }

            if self.clock.now().duration_since(attempt.started) >= timeout {
                attempt.details.suggestions = self.suggestions(&tree, target);
                return self.fail(
                    attempt,
                    FailureKind::Timeout,
                    format!(
                        "Timed out after {}ms looking for {} ({} scroll(s))",
                        timeout.as_millis(),
                        target,
                        gestures
                    ),
                );
            }

            let gesture = ScrollGesture {
                direction,
                distance: None,
                anchor: None,
            };
            match self.device.scroll(&gesture).await {
                Ok(response) if response.success => {}
                Ok(response) => {
                    let error = response
                        .error
                        .unwrap_or_else(|| "Device rejected scroll".to_string());
                    return self.fail(attempt, FailureKind::DeviceRejected, error);
                }
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            }
            gestures += 1;

            self.clock.sleep(self.config.settle_delay).await;
        }
    }

    /// Poll snapshots until the textual query matches something, without
    /// performing any gestures
    pub async fn wait_for(&self, query: &str, timeout: Duration) -> ActionResult {
        let mut attempt = self.begin("wait_for");
        let mut polls: u32 = 0;

        loop {
            let tree = match self.device.snapshot().await {
                Ok(tree) => tree,
                Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
            };
            polls += 1;
            attempt.details.attempts = Some(polls);

            let found = match find_by_query_string(&tree, query) {
                Ok(found) => found,
                Err(e) => return self.fail(attempt, FailureKind::InvalidTarget, e.to_string()),
            };
            if let Some(element) = found.first() {
                attempt.details.matched = Some(format_element(element));
                return self.succeed(attempt);
            }

            if self.clock.now().duration_since(attempt.started) >= timeout {
                let needle = query.trim().trim_matches(['#', '"', '\'', '*']);
                attempt.details.suggestions = self.suggest(&tree, needle);
                return self.fail(
                    attempt,
                    FailureKind::Timeout,
                    format!("Timed out after {}ms waiting for {}", timeout.as_millis(), query),
                );
            }

            self.clock.sleep(self.config.poll_interval).await;
        }
    }

    /// Resolve a textual query against a fresh snapshot
    pub async fn find(&self, query: &str) -> ActionResult {
        let mut attempt = self.begin("find");

        let tree = match self.device.snapshot().await {
            Ok(tree) => tree,
            Err(e) => return self.fail(attempt, FailureKind::DeviceError, e.to_string()),
        };

        match find_by_query_string(&tree, query) {
            Ok(found) => {
                let elements: Vec<Value> = found
                    .iter()
                    .map(|e| serde_json::to_value(strip_children(e)).unwrap_or(Value::Null))
                    .collect();
                attempt.details.matched = found.first().map(|e| format_element(e));
                attempt.details.data = Some(json!({
                    "count": found.len(),
                    "total_searched": tree.node_count(),
                    "summary": crate::device::serializer::format_elements_compact(&found),
                    "elements": elements,
                }));
                self.succeed(attempt)
            }
            Err(e) => self.fail(attempt, FailureKind::InvalidTarget, e.to_string()),
        }
    }

    fn begin(&self, action_type: &'static str) -> Attempt {
        Attempt {
            action_type,
            started: self.clock.now(),
            details: ActionDetails::default(),
            warning: None,
        }
    }

    /// Locating phase for direct gestures: a single lookup, no retries
    async fn locate_once(&self, target: &ActionTarget) -> anyhow::Result<Lookup> {
        if let Some(point) = target.point() {
            return Ok(Lookup::Found(Located {
                point,
                element: None,
            }));
        }

        let tree = self.device.snapshot().await?;
        let query = target
            .to_query()
            .ok_or_else(|| anyhow::anyhow!("Target {} has no element query", target))?;
        let result = find_elements(&tree, &query);

        // Prefer something the user could actually touch
        let actionable = ElementQuery {
            visible: Some(true),
            enabled: Some(true),
            ..query
        };
        let element = result
            .elements
            .iter()
            .copied()
            .filter(|e| actionable.matches(e))
            .min_by(|a, b| {
                a.frame
                    .y
                    .total_cmp(&b.frame.y)
                    .then(a.frame.x.total_cmp(&b.frame.x))
            })
            .or_else(|| result.first_by_position());

        Ok(match element {
            Some(element) => Lookup::Found(Located {
                point: element.frame.center(),
                element: Some(strip_children(element)),
            }),
            None => Lookup::NotFound {
                suggestions: self.suggestions(&tree, target),
            },
        })
    }

    fn suggestions(&self, tree: &UIElement, target: &ActionTarget) -> Vec<String> {
        target
            .needle()
            .map(|needle| self.suggest(tree, needle))
            .unwrap_or_default()
    }

    /// Similar elements, ranking same-type elements after name matches
    fn suggest(&self, tree: &UIElement, needle: &str) -> Vec<String> {
        let hint = type_hint(tree, needle);
        suggest_similar(tree, needle, hint, self.config.suggestion_limit)
    }

    /// Verifying phase: fold the device response into the result
    fn verify(&self, attempt: Attempt, response: anyhow::Result<DeviceResponse>) -> ActionResult {
        match response {
            Ok(response) if response.success => {
                let mut attempt = attempt;
                if response.data.is_some() {
                    attempt.details.data = response.data;
                }
                self.succeed(attempt)
            }
            Ok(response) => {
                let error = response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| format!("Device rejected {}", attempt.action_type));
                self.fail(attempt, FailureKind::DeviceRejected, error)
            }
            Err(e) => self.fail(attempt, FailureKind::DeviceError, e.to_string()),
        }
    }

    fn elapsed_ms(&self, started: Instant) -> u64 {
        u64::try_from(self.clock.now().duration_since(started).as_millis()).unwrap_or(u64::MAX)
    }

    fn succeed(&self, attempt: Attempt) -> ActionResult {
        if let Some(ref warning) = attempt.warning {
            tracing::warn!("{}: {}", attempt.action_type, warning);
        }
        ActionResult {
            success: true,
            status: ActionStatus::Success,
            action_type: attempt.action_type.to_string(),
            duration_ms: self.elapsed_ms(attempt.started),
            error: None,
            failure: None,
            warning: attempt.warning,
            details: attempt.details,
        }
    }

    fn fail(&self, attempt: Attempt, kind: FailureKind, error: String) -> ActionResult {
        tracing::warn!("{} failed ({:?}): {}", attempt.action_type, kind, error);
        ActionResult {
            success: false,
            status: ActionStatus::Failed,
            action_type: attempt.action_type.to_string(),
            duration_ms: self.elapsed_ms(attempt.started),
            error: Some(error),
            failure: Some(kind),
            warning: attempt.warning,
            details: attempt.details,
        }
    }
}

/// Type of the first element whose identifier or label partially matches
fn type_hint<'t>(tree: &'t UIElement, needle: &str) -> Option<&'t str> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    tree.iter()
        .find(|e| {
            [&e.identifier, &e.label].into_iter().flatten().any(|name| {
                let name = name.to_lowercase();
                !name.is_empty() && (name.contains(&needle) || needle.contains(&name))
            })
        })
        .map(|e| e.element_type.as_str())
}

fn not_found(target: &ActionTarget) -> String {
    format!("Element {} not found", target)
}

fn state_warning(element: &UIElement) -> Option<String> {
    match (element.enabled, element.visible) {
        (true, true) => None,
        (false, true) => Some(format!("Target {} is disabled", format_element(element))),
        (true, false) => Some(format!("Target {} is hidden", format_element(element))),
        (false, false) => Some(format!(
            "Target {} is disabled and hidden",
            format_element(element)
        )),
    }
}

fn strip_children(element: &UIElement) -> UIElement {
    UIElement {
        children: Vec::new(),
        ..element.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RecordedGesture, ReplayDevice};
    use crate::gesture::clock::ManualClock;
    use crate::gesture::target::parse_target;

    fn screen() -> UIElement {
        UIElement::new("Window")
            .with_frame(0.0, 0.0, 390.0, 844.0)
            .with_child(
                UIElement::new("Button")
                    .with_identifier("login_button")
                    .with_label("Log In")
                    .with_frame(20.0, 330.0, 350.0, 50.0),
            )
            .with_child(
                UIElement::new("Button")
                    .with_identifier("signup_button")
                    .with_frame(20.0, 400.0, 350.0, 50.0)
                    .disabled(),
            )
            .with_child(
                UIElement::new("ScrollView")
                    .with_identifier("feed")
                    .with_frame(0.0, 460.0, 390.0, 384.0),
            )
    }

    fn driver_for(device: Arc<ReplayDevice>, clock: Arc<ManualClock>) -> GestureDriver {
        GestureDriver::with_clock(device, clock, DriverConfig::default())
    }

    #[tokio::test]
    async fn test_tap_hits_element_center() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let result = driver
            .tap(&parse_target("#login_button").unwrap(), TapKind::Single)
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.status, ActionStatus::Success);
        assert!(result.details.matched.unwrap().contains("#login_button"));

        let gestures = device.gestures().await;
        assert_eq!(
            gestures,
            vec![RecordedGesture::Tap {
                point: crate::device::Point::new(195.0, 355.0),
                kind: TapKind::Single
            }]
        );
    }

    #[tokio::test]
    async fn test_tap_by_label_and_coordinates() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        assert!(driver.tap(&parse_target("\"Log In\"").unwrap(), TapKind::Double).await.success);
        let result = driver.tap(&parse_target("10,20").unwrap(), TapKind::Single).await;
        assert!(result.success);
        assert!(result.details.matched.is_none());
        assert_eq!(device.gestures().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_target_fails_with_suggestions_and_no_gesture() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let result = driver
            .tap(&parse_target("#login_btn").unwrap(), TapKind::Single)
            .await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::ElementNotFound));
        assert_eq!(result.details.suggestions, vec!["#login_button"]);
        assert!(device.gestures().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_label_suggests_elements_of_the_same_type() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let result = driver
            .tap(&parse_target("\"Log\"").unwrap(), TapKind::Single)
            .await;
        assert_eq!(result.failure, Some(FailureKind::ElementNotFound));
        // The near-miss first, then the other Button; the ScrollView is unrelated
        assert_eq!(
            result.details.suggestions,
            vec!["#login_button", "#signup_button"]
        );
    }

    #[tokio::test]
    async fn test_disabled_target_is_a_warning() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device, Arc::new(ManualClock::new()));

        let result = driver
            .tap(&parse_target("#signup_button").unwrap(), TapKind::Single)
            .await;
        assert!(result.success);
        assert!(result.warning.unwrap().contains("disabled"));
    }

    #[tokio::test]
    async fn test_device_rejection_is_a_failure() {
        let device = Arc::new(ReplayDevice::new(screen()).rejecting("tap"));
        let driver = driver_for(device, Arc::new(ManualClock::new()));

        let result = driver
            .tap(&parse_target("#login_button").unwrap(), TapKind::Single)
            .await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::DeviceRejected));
    }

    #[tokio::test]
    async fn test_type_text_focuses_target_first() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let target = parse_target("#login_button").unwrap();
        let result = driver.type_text(Some(&target), "hello", true).await;
        assert!(result.success);

        let gestures = device.gestures().await;
        assert!(matches!(gestures[0], RecordedGesture::Tap { .. }));
        assert_eq!(
            gestures[1],
            RecordedGesture::Type {
                text: "hello".to_string(),
                clear_first: true
            }
        );
    }

    #[tokio::test]
    async fn test_scroll_in_container_anchors_gesture() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let container = parse_target("#feed").unwrap();
        let result = driver.scroll(Direction::Up, Some(200.0), Some(&container)).await;
        assert!(result.success);

        match &device.gestures().await[0] {
            RecordedGesture::Scroll(gesture) => {
                assert_eq!(gesture.direction, Direction::Up);
                assert_eq!(gesture.anchor, Some(crate::device::Point::new(195.0, 652.0)));
            }
            other => panic!("unexpected gesture {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scroll_to_finds_target_after_scrolling() {
        let hidden = UIElement::new("Window").with_child(
            UIElement::new("Cell").with_identifier("row_42").hidden(),
        );
        let shown = UIElement::new("Window").with_child(
            UIElement::new("Cell").with_identifier("row_42"),
        );
        let device = Arc::new(ReplayDevice::with_snapshots(vec![
            hidden.clone(),
            hidden,
            shown,
        ]));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let result = driver
            .scroll_to(&parse_target("#row_42").unwrap(), ScrollToOptions::default())
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.details.attempts, Some(2));
        assert_eq!(device.scroll_count().await, 2);
    }

    #[tokio::test]
    async fn test_scroll_to_respects_attempt_budget() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), Arc::new(ManualClock::new()));

        let result = driver
            .scroll_to(
                &parse_target("#never_there").unwrap(),
                ScrollToOptions {
                    max_attempts: Some(3),
                    ..Default::default()
                },
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::ElementNotFound));
        assert_eq!(device.scroll_count().await, 3);
    }

    #[tokio::test]
    async fn test_scroll_to_respects_wall_clock_budget() {
        let clock = Arc::new(ManualClock::new());
        let device = Arc::new(
            ReplayDevice::new(screen()).with_latency(clock.clone(), Duration::from_secs(4)),
        );
        let driver = driver_for(device.clone(), clock);

        let result = driver
            .scroll_to(
                &parse_target("#never_there").unwrap(),
                ScrollToOptions {
                    max_attempts: Some(100),
                    timeout: Some(Duration::from_secs(10)),
                    direction: Some(Direction::Up),
                },
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        // 4.3s per iteration (latency + settle): 0 -> 4.3 -> 8.6 -> 12.9
        assert_eq!(device.scroll_count().await, 3);
    }

    #[tokio::test]
    async fn test_scroll_to_rejects_coordinates() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device, Arc::new(ManualClock::new()));
        let result = driver
            .scroll_to(&parse_target("1,2").unwrap(), ScrollToOptions::default())
            .await;
        assert_eq!(result.failure, Some(FailureKind::InvalidTarget));
    }

    #[tokio::test]
    async fn test_wait_for_times_out_without_gestures() {
        let clock = Arc::new(ManualClock::new());
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device.clone(), clock.clone());

        let result = driver.wait_for("#spinner", Duration::from_secs(2)).await;
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        assert_eq!(result.details.attempts, Some(5));
        assert!(device.gestures().await.is_empty());

        let result = driver.wait_for("Button", Duration::from_secs(2)).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_find_reports_matches() {
        let device = Arc::new(ReplayDevice::new(screen()));
        let driver = driver_for(device, Arc::new(ManualClock::new()));

        let result = driver.find("Button").await;
        let data = result.details.data.unwrap();
        assert_eq!(data["count"], 2);
        assert_eq!(data["total_searched"], 4);
    }
}

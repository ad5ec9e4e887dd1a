//! End-to-end playbook runs against a replayed device.
//!
//! Every test drives the real action catalog through `PlaybookRunner`; the
//! virtual clock keeps scroll and wait loops instant.

use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use playbook_sidecar::device::{Point, RecordedGesture, ReplayDevice, UIElement};
use playbook_sidecar::gesture::{DriverConfig, GestureDriver, ManualClock};
use playbook_sidecar::playbook::{
    parser, PlaybookRunResult, PlaybookRunner, RunOptions, StepErrorKind, StepStatus,
};
use playbook_sidecar::tools::{register_builtin_actions, ActionRegistry, RegistryError};

// ============================================================================
// Fixtures
// ============================================================================

fn login_screen() -> UIElement {
    UIElement::new("Window")
        .with_frame(0.0, 0.0, 390.0, 844.0)
        .with_child(
            UIElement::new("TextField")
                .with_identifier("email_field")
                .with_placeholder("Email")
                .with_frame(20.0, 200.0, 350.0, 44.0),
        )
        .with_child(
            UIElement::new("SecureTextField")
                .with_identifier("password_field")
                .with_frame(20.0, 260.0, 350.0, 44.0),
        )
        .with_child(
            UIElement::new("Button")
                .with_identifier("login_button")
                .with_label("Log In")
                .with_frame(20.0, 330.0, 350.0, 50.0),
        )
}

/// One page of a scrolling list; rows are numbered from `first`
fn list_page(first: usize) -> UIElement {
    let mut table = UIElement::new("Table")
        .with_identifier("results")
        .with_frame(0.0, 100.0, 390.0, 700.0);
    for (i, row) in (first..first + 5).enumerate() {
        table = table.with_child(
            UIElement::new("Cell")
                .with_identifier(format!("row_{}", row))
                .with_label(format!("Row {}", row))
                .with_frame(0.0, 100.0 + 60.0 * i as f64, 390.0, 60.0),
        );
    }
    UIElement::new("Window")
        .with_frame(0.0, 0.0, 390.0, 844.0)
        .with_child(table)
}

struct Harness {
    device: Arc<ReplayDevice>,
    clock: Arc<ManualClock>,
    runner: PlaybookRunner,
}

fn harness(snapshots: Vec<UIElement>) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let device = Arc::new(ReplayDevice::with_snapshots(snapshots));
    let driver = Arc::new(GestureDriver::with_clock(
        device.clone(),
        clock.clone(),
        DriverConfig::default(),
    ));

    let mut registry = ActionRegistry::new();
    assert_ok!(register_builtin_actions(&mut registry, driver));

    Harness {
        device,
        clock,
        runner: PlaybookRunner::new(Arc::new(registry)),
    }
}

fn options() -> RunOptions {
    RunOptions {
        cwd: PathBuf::from("/work"),
        session_id: "session-1".to_string(),
        ..Default::default()
    }
}

async fn run(h: &Harness, yaml: &str, inputs: Value) -> PlaybookRunResult {
    let playbook = assert_ok!(parser::parse(yaml, None));
    let inputs: Map<String, Value> = inputs.as_object().cloned().unwrap_or_default();
    h.runner.run(&playbook, inputs, options()).await
}

fn taps(gestures: &[RecordedGesture]) -> Vec<Point> {
    gestures
        .iter()
        .filter_map(|g| match g {
            RecordedGesture::Tap { point, .. } => Some(*point),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_login_flow_with_templates_and_store_as() {
    let h = harness(vec![login_screen()]);
    let result = run(
        &h,
        r##"
name: Login
inputs:
  email: { type: string, required: true }
steps:
  - name: Enter email
    action: ios.type
    inputs:
      target: "#email_field"
      text: "{{ inputs.email }}"
  - action: ios.find
    inputs: { query: "#login_button" }
    store_as: found
  - action: ios.tap
    condition: "{{ variables.found.count }}"
    inputs: { target: "#login_button" }
"##,
        json!({"email": "ada@example.com"}),
    )
    .await;

    assert!(result.passed, "{:?}", result.error);
    assert_eq!(result.passed_steps, 3);
    assert_eq!(result.variables["found"]["count"], 1);
    assert_eq!(result.steps[0].inputs["text"], "ada@example.com");

    let gestures = h.device.gestures().await;
    assert!(gestures.iter().any(|g| matches!(
        g,
        RecordedGesture::Type { text, .. } if text == "ada@example.com"
    )));
    assert_eq!(taps(&gestures).last(), Some(&Point::new(195.0, 355.0)));
}

#[tokio::test]
async fn test_shorthand_step_runs_single_action() {
    let h = harness(vec![login_screen()]);
    let shorthand = r##"ios.tap --target "#login_button""##;
    let step = assert_ok!(parser::parse_shorthand(shorthand)).into_step();

    let record = h.runner.run_step(&step, Map::new(), options()).await;
    assert_eq!(record.status, StepStatus::Passed);
    assert_eq!(taps(&h.device.gestures().await), vec![Point::new(195.0, 355.0)]);
}

#[tokio::test]
async fn test_run_file_parses_and_runs() {
    let h = harness(vec![login_screen()]);
    let path = std::env::temp_dir().join(format!("playbook-{}.yaml", uuid::Uuid::new_v4()));
    assert_ok!(std::fs::write(
        &path,
        "name: From disk\nsteps:\n  - action: core.set\n    inputs: {value: 42}\n    store_as: answer\n",
    ));

    let result = assert_ok!(h.runner.run_file(&path, Map::new(), options()).await);
    let _ = std::fs::remove_file(&path);

    assert!(result.passed);
    assert_eq!(result.variables["answer"], 42);
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn test_failed_step_skips_the_rest() {
    let h = harness(vec![login_screen()]);
    let result = run(
        &h,
        r##"
name: Broken
steps:
  - action: ios.tap
    inputs: { target: "#login_btn" }
  - action: ios.tap
    inputs: { target: "#login_button" }
"##,
        json!({}),
    )
    .await;

    assert!(!result.passed);
    assert_eq!(result.passed_steps, 0);
    assert_eq!(result.failed_steps, 1);
    assert_eq!(result.skipped_steps, 1);

    let error = result.steps[0].error.as_ref().unwrap();
    assert_eq!(error.kind, StepErrorKind::ElementNotFound);
    assert!(error.suggestions.contains(&"#login_button".to_string()));
    assert!(taps(&h.device.gestures().await).is_empty());
}

#[tokio::test]
async fn test_continue_on_error_and_on_failure() {
    let h = harness(vec![login_screen()]);
    let result = run(
        &h,
        r##"
name: Recovering
steps:
  - action: ios.tap
    continue_on_error: true
    inputs: { target: "#missing" }
    on_failure:
      - action: core.log
        inputs: { message: "recovering", level: warn }
      - action: ios.tap
        inputs: { target: "#password_field" }
  - action: ios.tap
    inputs: { target: "#login_button" }
"##,
        json!({}),
    )
    .await;

    assert!(result.passed);
    assert_eq!(result.failed_steps, 1);
    assert_eq!(result.passed_steps, 1);

    let parent = &result.steps[0];
    assert_eq!(parent.status, StepStatus::Failed);
    assert_eq!(parent.on_failure.len(), 2);
    assert!(parent.on_failure.iter().all(|r| r.status == StepStatus::Passed));
    assert_eq!(parent.on_failure[1].path, "1.on_failure.2");

    assert_eq!(
        taps(&h.device.gestures().await),
        vec![Point::new(195.0, 282.0), Point::new(195.0, 355.0)]
    );
}

#[tokio::test]
async fn test_unknown_action_and_bad_input() {
    let h = harness(vec![login_screen()]);
    let result = run(
        &h,
        r##"
name: Mistakes
steps:
  - action: ios.teleport
    continue_on_error: true
  - action: ios.long_press
    continue_on_error: true
    inputs: { target: "#login_button", duration_ms: forever }
  - action: ios.type
"##,
        json!({}),
    )
    .await;

    let kinds: Vec<StepErrorKind> = result
        .steps
        .iter()
        .map(|r| r.error.as_ref().unwrap().kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            StepErrorKind::UnknownAction,
            StepErrorKind::Validation,
            StepErrorKind::Validation
        ]
    );
    assert!(!result.passed);
    assert!(h.device.gestures().await.is_empty());
}

#[tokio::test]
async fn test_device_rejection_fails_step() {
    let clock = Arc::new(ManualClock::new());
    let device = Arc::new(ReplayDevice::new(login_screen()).rejecting("boot"));
    let driver = Arc::new(GestureDriver::with_clock(
        device.clone(),
        clock,
        DriverConfig::default(),
    ));
    let mut registry = ActionRegistry::new();
    assert_ok!(register_builtin_actions(&mut registry, driver));
    let runner = PlaybookRunner::new(Arc::new(registry));

    let playbook = assert_ok!(parser::parse(
        "name: Boot\nsteps:\n  - action: ios.boot\n  - action: ios.install\n    inputs: {app_path: build/App.app}\n",
        None,
    ));
    let result = runner.run(&playbook, Map::new(), options()).await;

    assert_eq!(
        result.steps[0].error.as_ref().unwrap().kind,
        StepErrorKind::ActionExecution
    );
    assert_eq!(result.steps[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_install_resolves_relative_path() {
    let h = harness(vec![login_screen()]);
    let result = run(
        &h,
        "name: Install\nsteps:\n  - action: ios.install\n    inputs: {app_path: build/App.app}\n",
        json!({}),
    )
    .await;
    assert!(result.passed);

    let gestures = h.device.gestures().await;
    let params = gestures
        .iter()
        .find_map(|g| match g {
            RecordedGesture::Command { command, params } if command == "install" => Some(params),
            _ => None,
        })
        .expect("install command recorded");
    assert_eq!(params["app_path"], "/work/build/App.app");
}

// ============================================================================
// Scroll budgets
// ============================================================================

#[tokio::test]
async fn test_scroll_to_finds_row_on_later_page() {
    let h = harness(vec![list_page(0), list_page(5), list_page(10)]);
    let result = run(
        &h,
        "name: Scroll\nsteps:\n  - action: ios.scroll_to\n    inputs: {to: \"#row_12\"}\n",
        json!({}),
    )
    .await;

    assert!(result.passed, "{:?}", result.error);
    assert_eq!(h.device.scroll_count().await, 2);
}

#[tokio::test]
async fn test_scroll_to_respects_attempt_budget() {
    let pages = (0..10).map(|i| list_page(i * 5)).collect();
    let h = harness(pages);
    let result = run(
        &h,
        "name: Scroll\nsteps:\n  - action: ios.scroll_to\n    inputs: {to: \"#row_99\", max_attempts: 3}\n",
        json!({}),
    )
    .await;

    assert!(!result.passed);
    assert_eq!(
        result.steps[0].error.as_ref().unwrap().kind,
        StepErrorKind::ElementNotFound
    );
    assert_eq!(h.device.scroll_count().await, 3);
    // Settle delays ran on the virtual clock
    assert!(h.clock.elapsed() >= DriverConfig::default().settle_delay * 3);
}

// ============================================================================
// Dry run and cancellation
// ============================================================================

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let h = harness(vec![login_screen()]);
    let playbook = assert_ok!(parser::parse(
        r##"
name: Dry
steps:
  - action: ios.tap
    inputs: { target: "#nowhere" }
    store_as: tapped
  - action: ios.boot
"##,
        None,
    ));
    let result = h
        .runner
        .run(
            &playbook,
            Map::new(),
            RunOptions {
                dry_run: true,
                ..options()
            },
        )
        .await;

    assert!(result.passed);
    assert!(result.dry_run);
    assert_eq!(result.variables["tapped"], Value::Null);
    assert!(h.device.gestures().await.is_empty());
}

#[tokio::test]
async fn test_cancelled_run_skips_everything() {
    let h = harness(vec![login_screen()]);
    let playbook = assert_ok!(parser::parse(
        "name: Cancelled\nsteps:\n  - action: ios.boot\n  - action: ios.boot\n",
        None,
    ));
    let token = CancellationToken::new();
    token.cancel();

    let result = h
        .runner
        .run(
            &playbook,
            Map::new(),
            RunOptions {
                cancel: Some(token),
                ..options()
            },
        )
        .await;

    assert!(result.aborted);
    assert!(!result.passed);
    assert_eq!(result.skipped_steps, 2);
    assert!(h.device.gestures().await.is_empty());
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_builtin_catalog_rejects_duplicates() {
    let clock = Arc::new(ManualClock::new());
    let device = Arc::new(ReplayDevice::new(login_screen()));
    let driver = Arc::new(GestureDriver::with_clock(device, clock, DriverConfig::default()));

    let mut registry = ActionRegistry::new();
    assert_ok!(register_builtin_actions(&mut registry, driver.clone()));
    let count = registry.len();
    assert!(registry.has("ios.scroll_to"));
    assert!(registry.has("core.set"));

    let error = assert_err!(register_builtin_actions(&mut registry, driver));
    assert!(matches!(error, RegistryError::AlreadyRegistered(_)));
    assert_eq!(registry.len(), count);
}

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playbook_sidecar::api::{routes::create_router, state::AppState};
use playbook_sidecar::config::Config;
use playbook_sidecar::device::{DeviceController, ReplayDevice, UIElement};
use playbook_sidecar::gesture::{GestureDriver, TokioClock};
use playbook_sidecar::playbook::PlaybookRunner;
use playbook_sidecar::tools::{register_builtin_actions, ActionRegistry};

/// Device used when no snapshot file is configured
fn default_device() -> ReplayDevice {
    ReplayDevice::new(UIElement::new("Application").with_frame(0.0, 0.0, 390.0, 844.0))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let device: Arc<dyn DeviceController> = match &config.device_snapshot {
        Some(path) => {
            tracing::info!("Replaying device snapshots from {}", path.display());
            Arc::new(ReplayDevice::from_file(path)?)
        }
        None => {
            tracing::warn!("DEVICE_SNAPSHOT not set, serving an empty screen");
            Arc::new(default_device())
        }
    };

    let driver = Arc::new(GestureDriver::with_clock(
        device,
        Arc::new(TokioClock),
        config.driver_config(),
    ));

    let mut registry = ActionRegistry::new();
    register_builtin_actions(&mut registry, driver)?;
    tracing::info!("Registered {} actions", registry.len());

    let runner = Arc::new(PlaybookRunner::new(Arc::new(registry)));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config, runner));

    // Build router
    let app = create_router(state);

    tracing::info!("Playbook sidecar starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

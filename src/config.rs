use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::gesture::DriverConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// Default per-step handler budget; unset means unbounded
    pub step_timeout: Option<Duration>,
    pub scroll_max_attempts: u32,
    pub scroll_timeout: Duration,
    pub settle_delay: Duration,
    /// JSON file (one tree or an array of trees) served by the replay device
    pub device_snapshot: Option<PathBuf>,
    /// Working directory handed to action handlers
    pub cwd: PathBuf,
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

fn millis(name: &str) -> Option<Duration> {
    parsed::<u64>(name).map(Duration::from_millis)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            step_timeout: millis("PLAYBOOK_STEP_TIMEOUT_MS"),
            scroll_max_attempts: parsed("SCROLL_MAX_ATTEMPTS")
                .unwrap_or(defaults.scroll_max_attempts),
            scroll_timeout: millis("SCROLL_TIMEOUT_MS").unwrap_or(defaults.scroll_timeout),
            settle_delay: millis("GESTURE_SETTLE_MS").unwrap_or(defaults.settle_delay),
            device_snapshot: env::var_os("DEVICE_SNAPSHOT").map(PathBuf::from),
            cwd: env::var_os("PLAYBOOK_CWD")
                .map(PathBuf::from)
                .unwrap_or(defaults.cwd),
        }
    }

    /// Gesture budgets derived from this config
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            scroll_max_attempts: self.scroll_max_attempts,
            scroll_timeout: self.scroll_timeout,
            settle_delay: self.settle_delay,
            ..DriverConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let driver = DriverConfig::default();
        Self {
            port: 8766,
            host: "127.0.0.1".to_string(),
            step_timeout: None,
            scroll_max_attempts: driver.scroll_max_attempts,
            scroll_timeout: driver.scroll_timeout,
            settle_delay: driver.settle_delay,
            device_snapshot: None,
            cwd: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

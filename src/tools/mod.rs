// Tools module - action registry and the built-in action catalog

pub mod control_actions;
pub mod device_actions;
pub mod gesture_actions;
pub mod registry;

pub use control_actions::register_control_actions;
pub use device_actions::register_device_actions;
pub use gesture_actions::register_gesture_actions;
pub use registry::*;

use std::sync::Arc;

use crate::gesture::GestureDriver;

/// Register every built-in action (`ios.*` and `core.*`) backed by `driver`
pub fn register_builtin_actions(
    registry: &mut ActionRegistry,
    driver: Arc<GestureDriver>,
) -> Result<(), RegistryError> {
    register_device_actions(registry, driver.device().clone())?;
    register_control_actions(registry, driver.clock().clone())?;
    register_gesture_actions(registry, driver)?;
    Ok(())
}

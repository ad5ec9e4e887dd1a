//! Gesture layer: target parsing, the driver state machine and its time source.

pub mod clock;
pub mod driver;
pub mod target;

pub use clock::{Clock, ManualClock, TokioClock};
pub use driver::{
    ActionDetails, ActionResult, ActionStatus, DriverConfig, FailureKind, GestureDriver,
    ScrollToOptions,
};
pub use target::{parse_target, ActionTarget};

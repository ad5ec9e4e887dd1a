//! Device-side model: UI snapshots, queries over them, and the device
//! control boundary.
//!
//! ## Architecture
//!
//! - `UIElement` - one node of an accessibility snapshot (immutable once built)
//! - `ElementQuery` / `find_elements` - pure, deterministic lookups over a tree
//! - `DeviceController` - the transport to a simulator or device
//! - `ReplayDevice` - a controller that serves recorded snapshots offline
//!
//! ## Example
//!
//! ```rust,ignore
//! use playbook_sidecar::device::{find_elements, ElementQuery, ReplayDevice, DeviceController};
//!
//! let device = ReplayDevice::from_file(Path::new("login.json"))?;
//! let tree = device.snapshot().await?;
//! let result = find_elements(&tree, &ElementQuery::by_identifier("login_button"));
//! println!("{} match(es) out of {} nodes", result.len(), result.total_searched);
//! ```

pub mod controller;
pub mod query;
pub mod replay;
pub mod serializer;
pub mod types;

pub use controller::DeviceController;
pub use query::{
    find_by_query_string, find_elements, parse_query_string, sort_by_position, suggest_similar,
    ElementQuery, FindResult, QueryParseError, TypeFilter,
};
pub use replay::{RecordedGesture, ReplayDevice};
pub use types::{
    DeviceResponse, Direction, Frame, Point, ScrollGesture, SwipeGesture, SwipeVelocity, TapKind,
    UIElement,
};

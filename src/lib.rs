pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod gesture;
pub mod playbook;
pub mod tools;

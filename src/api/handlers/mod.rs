pub mod actions;
pub mod health;
pub mod playbooks;
pub mod runs;
pub mod steps;

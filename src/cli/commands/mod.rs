//! CLI command implementations

pub mod cache;
pub mod config;
pub mod stage;

pub use cache::execute as cache;
pub use config::execute as config;
pub use stage::{execute as stage, Stage};

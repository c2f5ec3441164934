//! graphdelta engine - orchestration boundary
//!
//! Wraps a tracked graph and runs the save round trip against a store
//! handle, owning the lifecycle logging and request correlation for it.

pub mod config;
pub mod tracker;

pub use config::{LoggingConfig, TrackerConfig};
pub use tracker::{ChangeTracker, SaveOutcome};

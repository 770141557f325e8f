//! Shared foundations for the Stagehand control plane.
//!
//! Clock and id utilities, domain primitives, the top-level error type,
//! and application configuration.

pub mod config;
pub mod error;
pub mod id;
pub mod types;

pub use config::{AutonomyConfig, StagehandConfig};
pub use error::{Result, StagehandError};
pub use id::IdAllocator;
pub use types::*;

//! # Stampede Common
//!
//! Errors, configuration, metrics and the module registry shared by all
//! Stampede crates.

pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod testing;

pub use config::*;
pub use error::{BoxError, Error, Result};
pub use registry::{Exports, Module, ModuleInstance, ModuleRegistry, SessionInfo};

/// Re-export commonly used external types
pub mod prelude {
    pub use super::error::{BoxError, Error, Result};
    pub use super::registry::SessionInfo;
    pub use async_trait::async_trait;
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

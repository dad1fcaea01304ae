//! # Stampede Runner
//!
//! Host side of Stampede:
//! - Registers the MongoDB module and instantiates it per session
//! - Drives concurrent sessions through connect and repeated aggregates
//! - Collects run metrics and reports a summary
//! - Sets up logging for the `stampede` binary

pub mod logging;
pub mod runner;

pub use logging::{env_filter, init_logging};
pub use runner::{stage_document, LoadRunner, RunReport, SessionOutcome};

pub use stampede_common;
pub use stampede_mongo;

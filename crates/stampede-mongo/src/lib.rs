//! # Stampede Mongo
//!
//! MongoDB module for Stampede load scripts providing:
//! - One isolated client per session
//! - Connect with a reachability probe decoupled from the dial deadline
//! - Timed, fully materialized single-stage aggregation
//!
//! ## Example
//!
//! ```ignore
//! use stampede_common::{ModuleRegistry, SessionInfo};
//! use stampede_mongo::{ExecContext, MongoDialer, SessionClient, MODULE_PATH};
//!
//! let mut registry = ModuleRegistry::new();
//! stampede_mongo::register(&mut registry, MongoDialer::default())?;
//!
//! let mut client = registry
//!     .instantiate(MODULE_PATH, SessionInfo::new(1))?
//!     .into_default::<SessionClient>()?;
//!
//! client.connect("mongodb://localhost:27017", &ExecContext::with_timeout(timeout)).await?;
//! let response = client
//!     .aggregate("shop", "orders", doc! { "$match": { "status": "active" } }, &ctx)
//!     .await?;
//! println!("{} documents in {:?}", response.results.len(), response.duration);
//! ```

pub mod context;
pub mod driver;
pub mod module;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::ExecContext;
pub use driver::{ConnectionHandle, Dialer, DocumentStream, MongoDialer, MongoHandle};
pub use module::{register, SessionFactory, MODULE_PATH};
pub use session::{AggregateResponse, SessionClient, SessionState};

pub use mongodb::bson;

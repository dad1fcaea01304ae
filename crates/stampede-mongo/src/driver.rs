//! Driver Seam
//!
//! Traits isolating the session logic from the database driver, and their
//! MongoDB implementation:
//! - `Dialer` builds a connection handle from a connection string
//! - `ConnectionHandle` probes reachability and issues aggregation pipelines
//!
//! Errors are returned unclassified; the session decides which phase they
//! belong to.

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, ReadPreference, ReadPreferenceOptions, SelectionCriteria},
    Client,
};
use tracing::debug;

use stampede_common::config::redact_uri;
use stampede_common::prelude::async_trait;
use stampede_common::BoxError;

/// Result cursor, drained by the session
pub type DocumentStream = BoxStream<'static, std::result::Result<Document, BoxError>>;

/// Opens connection handles
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Handle: ConnectionHandle;

    /// Build a handle from a connection string. Fails on malformed URIs and
    /// transport-level errors.
    async fn dial(&self, uri: &str) -> std::result::Result<Self::Handle, BoxError>;
}

/// An opened, possibly pooled, connection
#[async_trait]
pub trait ConnectionHandle: Send + Sync + 'static {
    /// Lightweight health check tolerant of any reachable member
    async fn ping(&self) -> std::result::Result<(), BoxError>;

    /// Issue `pipeline` against `database.collection` and return its cursor
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> std::result::Result<DocumentStream, BoxError>;
}

// ============================================================================
// MongoDB Driver
// ============================================================================

/// Default application name reported to the server
pub const DEFAULT_APP_NAME: &str = "stampede";

/// Dials MongoDB through the official driver
#[derive(Debug, Clone)]
pub struct MongoDialer {
    app_name: Option<String>,
}

impl MongoDialer {
    pub fn new() -> Self {
        Self {
            app_name: Some(DEFAULT_APP_NAME.to_string()),
        }
    }

    /// Override the application name; `None` leaves it unset
    pub fn with_app_name(mut self, app_name: Option<String>) -> Self {
        self.app_name = app_name;
        self
    }
}

impl Default for MongoDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialer for MongoDialer {
    type Handle = MongoHandle;

    async fn dial(&self, uri: &str) -> std::result::Result<MongoHandle, BoxError> {
        // SRV and TXT lookups for mongodb+srv happen here
        let mut options = ClientOptions::parse(uri).await?;
        if options.app_name.is_none() {
            options.app_name = self.app_name.clone();
        }

        let client = Client::with_options(options)?;
        debug!(uri = %redact_uri(uri), "MongoDB client built");

        Ok(MongoHandle { client })
    }
}

/// Handle wrapping a pooled `mongodb::Client`
#[derive(Debug, Clone)]
pub struct MongoHandle {
    client: Client,
}

impl MongoHandle {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ConnectionHandle for MongoHandle {
    async fn ping(&self) -> std::result::Result<(), BoxError> {
        let nearest = SelectionCriteria::ReadPreference(ReadPreference::Nearest {
            options: ReadPreferenceOptions::default(),
        });

        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, nearest)
            .await?;

        Ok(())
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> std::result::Result<DocumentStream, BoxError> {
        let cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .aggregate(pipeline, None)
            .await?;

        Ok(cursor.map_err(|e| Box::new(e) as BoxError).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_rejects_malformed_uri() {
        let dialer = MongoDialer::new();
        assert!(dialer.dial("not-a-uri").await.is_err());
        assert!(dialer.dial("postgres://localhost:5432").await.is_err());
    }

    #[tokio::test]
    async fn test_dial_is_lazy() {
        // Building a client does not contact the server
        let dialer = MongoDialer::new();
        let handle = dialer.dial("mongodb://127.0.0.1:1").await.unwrap();
        assert!(handle.client().default_database().is_none());
    }

    #[tokio::test]
    async fn test_app_name_override() {
        let dialer = MongoDialer::new().with_app_name(Some("checkout-load".to_string()));
        assert_eq!(dialer.app_name.as_deref(), Some("checkout-load"));

        let dialer = MongoDialer::new().with_app_name(None);
        assert!(dialer.app_name.is_none());
    }
}

//! Session Client
//!
//! One client per load session. Holds at most one connection handle and
//! exposes the two script operations:
//! - `connect`: dial under the caller's context, then probe reachability
//!   under an independent background context before committing the handle
//! - `aggregate`: run a single-stage pipeline, drain the cursor fully and
//!   report the client-observed duration

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use mongodb::bson::Document;
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use stampede_common::config::redact_uri;
use stampede_common::prelude::*;

use crate::context::ExecContext;
use crate::driver::{ConnectionHandle, Dialer, MongoDialer};

// ============================================================================
// Session State
// ============================================================================

/// Connection state of a session client
#[derive(Debug)]
pub enum SessionState<H> {
    /// No connect has succeeded yet
    Disconnected,
    /// Probed, committed handle
    Connected(H),
}

impl<H> SessionState<H> {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected(_))
    }
}

// ============================================================================
// Aggregate Response
// ============================================================================

/// Fully materialized aggregation result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AggregateResponse {
    /// Every document the pipeline produced, in cursor order
    pub results: Vec<Document>,
    /// Issuance to full materialization, serialized as nanoseconds
    #[serde(serialize_with = "serialize_nanos")]
    pub duration: Duration,
}

impl AggregateResponse {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

fn serialize_nanos<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    serializer.serialize_u64(nanos)
}

// ============================================================================
// Session Client
// ============================================================================

/// Per-session database client
pub struct SessionClient<D: Dialer = MongoDialer> {
    session: SessionInfo,
    dialer: Arc<D>,
    state: SessionState<D::Handle>,
}

impl<D: Dialer> SessionClient<D> {
    /// Create an empty, disconnected client
    pub fn new(session: SessionInfo, dialer: Arc<D>) -> Self {
        Self {
            session,
            dialer,
            state: SessionState::Disconnected,
        }
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn state(&self) -> &SessionState<D::Handle> {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Open a connection to `uri` and commit it once it answers a ping.
    ///
    /// The dial runs under `ctx`. The probe runs under its own background
    /// context so a short dial deadline cannot cut it off. On any failure
    /// the previous state is left as it was.
    #[instrument(skip_all, fields(session = self.session.id))]
    pub async fn connect(&mut self, uri: &str, ctx: &ExecContext) -> Result<()> {
        let dialer = Arc::clone(&self.dialer);
        let handle = ctx
            .run("connect", async move {
                dialer.dial(uri).await.map_err(Error::Connection)
            })
            .await
            .map_err(|e| {
                warn!(uri = %redact_uri(uri), error = %e, "Dial failed");
                e
            })?;

        let probe = ExecContext::background();
        probe
            .run("ping", async {
                handle.ping().await.map_err(Error::Reachability)
            })
            .await
            .map_err(|e| {
                warn!(uri = %redact_uri(uri), error = %e, "Reachability probe failed");
                e
            })?;

        if self.state.is_connected() {
            debug!("Replacing existing connection handle");
        }
        self.state = SessionState::Connected(handle);

        info!(uri = %redact_uri(uri), "Session connected");
        Ok(())
    }

    /// Run `stage` as a one-stage pipeline against `database.collection`.
    ///
    /// Returns every resulting document and the elapsed time from issuance
    /// to full materialization. Never returns a partial result.
    #[instrument(skip(self, stage, ctx), fields(session = self.session.id))]
    pub async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        stage: Document,
        ctx: &ExecContext,
    ) -> Result<AggregateResponse> {
        let handle = match &self.state {
            SessionState::Connected(handle) => handle,
            SessionState::Disconnected => return Err(Error::NotConnected("aggregate")),
        };

        let start = Instant::now();
        let pipeline = vec![stage];

        let results = ctx
            .run("aggregate", async {
                let mut cursor = handle
                    .aggregate(database, collection, pipeline)
                    .await
                    .map_err(Error::Query)?;

                let mut documents = Vec::new();
                while let Some(next) = cursor.next().await {
                    documents.push(next.map_err(Error::Materialization)?);
                }
                Ok(documents)
            })
            .await?;

        let duration = start.elapsed();
        debug!(
            documents = results.len(),
            duration = ?duration,
            "Aggregate completed"
        );

        Ok(AggregateResponse { results, duration })
    }
}

impl<D: Dialer> std::fmt::Debug for SessionClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session.id)
            .field("connected", &self.state.is_connected())
            .finish()
    }
}

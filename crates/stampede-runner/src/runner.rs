//! Load Runner
//!
//! Plays the host role for the MongoDB module: instantiates one module
//! instance per session through the registry, connects each session, then
//! issues the configured aggregation stage `iterations` times. All sessions
//! run as independent tokio tasks and stop when the root context is
//! cancelled.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use stampede_common::config::{redact_uri, RunnerConfig};
use stampede_common::metrics::{Gauge, LoadMetrics, MetricsSnapshot};
use stampede_common::prelude::*;
use stampede_common::registry::ModuleRegistry;
use stampede_mongo::bson::{self, Document};
use stampede_mongo::{Dialer, ExecContext, SessionClient, MODULE_PATH};

/// How one session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Ran every iteration
    Completed,
    /// Connect failed; no aggregates were issued
    ConnectFailed,
    /// Stopped early by cancellation of the run
    Cancelled,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sessions: usize,
    pub completed: usize,
    pub connect_failed: usize,
    pub cancelled: usize,
    /// Session tasks that panicked
    pub panicked: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub metrics: MetricsSnapshot,
}

impl RunReport {
    /// Aggregates per second over the whole run
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.metrics.aggregates_total as f64 / secs
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Drives `config.load.sessions` concurrent sessions
pub struct LoadRunner<D: Dialer> {
    registry: Arc<ModuleRegistry>,
    config: Arc<RunnerConfig>,
    stage: Document,
    metrics: Arc<LoadMetrics>,
    root: ExecContext,
    _dialer: PhantomData<fn() -> D>,
}

impl<D: Dialer> LoadRunner<D> {
    /// `registry` must have the MongoDB module registered with dialer `D`
    pub fn new(registry: ModuleRegistry, config: RunnerConfig) -> Result<Self> {
        if !registry.contains(MODULE_PATH) {
            return Err(Error::ModuleNotFound(MODULE_PATH.to_string()));
        }
        let stage = stage_document(&config.target.stage)?;

        Ok(Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            stage,
            metrics: Arc::new(LoadMetrics::new()),
            root: ExecContext::background(),
            _dialer: PhantomData,
        })
    }

    /// Context whose cancellation stops every session
    pub fn root_context(&self) -> ExecContext {
        self.root.clone()
    }

    pub fn metrics(&self) -> Arc<LoadMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run all sessions to completion (or cancellation)
    pub async fn run(&self) -> Result<RunReport> {
        let sessions = self.config.load.sessions;
        info!(
            sessions,
            iterations = self.config.load.iterations,
            uri = %redact_uri(&self.config.target.uri),
            database = %self.config.target.database,
            collection = %self.config.target.collection,
            "Starting load run"
        );

        let started = Instant::now();
        let mut handles = Vec::with_capacity(sessions);

        for id in 1..=sessions as u64 {
            let client = self
                .registry
                .instantiate(MODULE_PATH, SessionInfo::new(id))?
                .into_default::<SessionClient<D>>()?;

            let worker = SessionWorker {
                config: Arc::clone(&self.config),
                stage: self.stage.clone(),
                metrics: Arc::clone(&self.metrics),
                root: self.root.clone(),
            };
            handles.push(tokio::spawn(async move { worker.run(client).await }));
        }

        let mut report = RunReport {
            sessions,
            completed: 0,
            connect_failed: 0,
            cancelled: 0,
            panicked: 0,
            elapsed: Duration::ZERO,
            metrics: self.metrics.snapshot(),
        };

        for handle in handles {
            match handle.await {
                Ok(SessionOutcome::Completed) => report.completed += 1,
                Ok(SessionOutcome::ConnectFailed) => report.connect_failed += 1,
                Ok(SessionOutcome::Cancelled) => report.cancelled += 1,
                Err(e) => {
                    error!(error = %e, "Session task panicked");
                    report.panicked += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        report.metrics = self.metrics.snapshot();

        info!(
            completed = report.completed,
            connect_failed = report.connect_failed,
            cancelled = report.cancelled,
            panicked = report.panicked,
            elapsed = %humantime::format_duration(report.elapsed),
            "Load run finished"
        );

        Ok(report)
    }
}

/// Convert the configured stage into a BSON document
pub fn stage_document(stage: &serde_json::Value) -> Result<Document> {
    match stage {
        serde_json::Value::Object(map) if map.len() == 1 => bson::to_document(stage)
            .map_err(|e| Error::Config(format!("invalid aggregation stage: {}", e))),
        _ => Err(Error::Config(
            "aggregation stage must be a single-key table".to_string(),
        )),
    }
}

/// Holds the active-session gauge up until dropped, including on panic
struct ActiveSession<'a>(&'a Gauge);

impl<'a> ActiveSession<'a> {
    fn enter(gauge: &'a Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

struct SessionWorker {
    config: Arc<RunnerConfig>,
    stage: Document,
    metrics: Arc<LoadMetrics>,
    root: ExecContext,
}

impl SessionWorker {
    async fn run<D: Dialer>(self, mut client: SessionClient<D>) -> SessionOutcome {
        let _active = ActiveSession::enter(&self.metrics.active_sessions);
        self.drive(&mut client).await
    }

    async fn drive<D: Dialer>(&self, client: &mut SessionClient<D>) -> SessionOutcome {
        let session = client.session().id;
        let load = &self.config.load;
        let target = &self.config.target;

        let dial_ctx = self.root.child_with_timeout(load.dial_timeout);
        if let Err(e) = client.connect(&target.uri, &dial_ctx).await {
            if self.root.is_cancelled() {
                return SessionOutcome::Cancelled;
            }
            warn!(session, error = %e, code = e.code(), "Session could not connect");
            self.metrics.record_connect_failure();
            return SessionOutcome::ConnectFailed;
        }
        self.metrics.record_connect_success();

        for iteration in 0..load.iterations {
            if self.root.is_cancelled() {
                return SessionOutcome::Cancelled;
            }

            let ctx = self.root.child_with_timeout(load.request_timeout);
            match client
                .aggregate(&target.database, &target.collection, self.stage.clone(), &ctx)
                .await
            {
                Ok(response) => {
                    self.metrics
                        .record_aggregate_success(response.results.len(), response.duration);
                }
                Err(e) if self.root.is_cancelled() => {
                    debug!(session, error = %e, "Aggregate interrupted by shutdown");
                    return SessionOutcome::Cancelled;
                }
                Err(e) => {
                    debug!(session, iteration, error = %e, code = e.code(), "Aggregate failed");
                    self.metrics.record_aggregate_failure();
                }
            }

            if !load.think_time.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(load.think_time) => {}
                    _ = self.root.cancelled() => return SessionOutcome::Cancelled,
                }
            }
        }

        SessionOutcome::Completed
    }
}

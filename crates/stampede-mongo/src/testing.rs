//! In-memory driver for tests
//!
//! `MockDialer` accepts any `mongodb://` URI, answers pings only for the
//! configured reachable URI and serves fixed documents per collection.
//! Call counters let tests assert which network operations happened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mongodb::bson::Document;
use parking_lot::Mutex;

use stampede_common::prelude::async_trait;
use stampede_common::BoxError;

use crate::driver::{ConnectionHandle, Dialer, DocumentStream};

/// Failure injection and latency knobs
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub dial_delay: Duration,
    pub ping_delay: Duration,
    pub aggregate_delay: Duration,
    /// Fail every aggregate at issuance
    pub reject_pipeline: bool,
    /// Fail the cursor after yielding this many documents
    pub fail_after: Option<usize>,
    /// Panic inside aggregate, as a buggy driver would
    pub panic_on_aggregate: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            dial_delay: Duration::ZERO,
            ping_delay: Duration::ZERO,
            aggregate_delay: Duration::from_millis(1),
            reject_pipeline: false,
            fail_after: None,
            panic_on_aggregate: false,
        }
    }
}

/// One recorded aggregate invocation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub database: String,
    pub collection: String,
    pub pipeline: Vec<Document>,
}

#[derive(Debug, Default)]
struct Recorder {
    dials: AtomicU64,
    pings: AtomicU64,
    aggregates: Mutex<Vec<AggregateCall>>,
}

#[derive(Debug)]
struct Dataset {
    reachable_uri: String,
    default_documents: Vec<Document>,
    collections: HashMap<(String, String), Vec<Document>>,
    behavior: MockBehavior,
}

/// Test dialer serving canned documents. Clones share call counters, so a
/// test can keep one clone after handing the other to a factory.
#[derive(Debug, Clone)]
pub struct MockDialer {
    dataset: Arc<Dataset>,
    recorder: Arc<Recorder>,
}

impl MockDialer {
    /// Reachable at `reachable_uri`; every collection returns `documents`
    /// unless overridden with [`MockDialer::collection`]
    pub fn with_documents(reachable_uri: &str, documents: Vec<Document>) -> Self {
        Self {
            dataset: Arc::new(Dataset {
                reachable_uri: reachable_uri.to_string(),
                default_documents: documents,
                collections: HashMap::new(),
                behavior: MockBehavior::default(),
            }),
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Serve `documents` for `database.collection`
    pub fn collection(mut self, database: &str, collection: &str, documents: Vec<Document>) -> Self {
        self.dataset_mut()
            .collections
            .insert((database.to_string(), collection.to_string()), documents);
        self
    }

    pub fn behavior(mut self, behavior: MockBehavior) -> Self {
        self.dataset_mut().behavior = behavior;
        self
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        Arc::get_mut(&mut self.dataset).expect("configure MockDialer before cloning or dialing")
    }

    pub fn dials(&self) -> u64 {
        self.recorder.dials.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u64 {
        self.recorder.pings.load(Ordering::SeqCst)
    }

    pub fn aggregate_calls(&self) -> Vec<AggregateCall> {
        self.recorder.aggregates.lock().clone()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    type Handle = MockHandle;

    async fn dial(&self, uri: &str) -> Result<MockHandle, BoxError> {
        self.recorder.dials.fetch_add(1, Ordering::SeqCst);
        if !self.dataset.behavior.dial_delay.is_zero() {
            tokio::time::sleep(self.dataset.behavior.dial_delay).await;
        }

        if !uri.starts_with("mongodb://") && !uri.starts_with("mongodb+srv://") {
            return Err(format!("invalid connection string: {}", uri).into());
        }

        Ok(MockHandle {
            uri: uri.to_string(),
            dataset: Arc::clone(&self.dataset),
            recorder: Arc::clone(&self.recorder),
        })
    }
}

/// Handle produced by [`MockDialer`]
#[derive(Debug)]
pub struct MockHandle {
    uri: String,
    dataset: Arc<Dataset>,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl ConnectionHandle for MockHandle {
    async fn ping(&self) -> Result<(), BoxError> {
        self.recorder.pings.fetch_add(1, Ordering::SeqCst);
        if !self.dataset.behavior.ping_delay.is_zero() {
            tokio::time::sleep(self.dataset.behavior.ping_delay).await;
        }

        if self.uri == self.dataset.reachable_uri {
            Ok(())
        } else {
            Err(format!("server selection timeout for {}", self.uri).into())
        }
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<DocumentStream, BoxError> {
        self.recorder.aggregates.lock().push(AggregateCall {
            database: database.to_string(),
            collection: collection.to_string(),
            pipeline,
        });

        let behavior = &self.dataset.behavior;
        if !behavior.aggregate_delay.is_zero() {
            tokio::time::sleep(behavior.aggregate_delay).await;
        }
        if behavior.panic_on_aggregate {
            panic!("mock driver panicked in aggregate");
        }
        if behavior.reject_pipeline {
            return Err("unrecognized pipeline stage name".into());
        }

        let documents = self
            .dataset
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .unwrap_or(&self.dataset.default_documents)
            .clone();

        let fail_after = behavior.fail_after;
        let items = documents
            .into_iter()
            .enumerate()
            .map(move |(i, doc)| match fail_after {
                Some(limit) if i >= limit => Err::<Document, BoxError>("connection reset by peer".into()),
                _ => Ok(doc),
            });

        Ok(futures::stream::iter(items).boxed())
    }
}

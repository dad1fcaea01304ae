//! Tests against a real MongoDB server
//!
//! Skipped unless `STAMPEDE_TEST_MONGO_URI` is set, e.g.
//! `STAMPEDE_TEST_MONGO_URI=mongodb://localhost:27017 cargo test -p stampede-mongo --test live_mongo`

use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::Client;
use stampede_common::{Error, SessionInfo};
use stampede_mongo::{ExecContext, MongoDialer, SessionClient, SessionFactory};

fn live_uri() -> Option<String> {
    std::env::var("STAMPEDE_TEST_MONGO_URI").ok()
}

/// Fresh collection with `count` documents; half of them active
async fn seed(uri: &str, collection: &str, count: i64) -> (String, String) {
    let database = format!("stampede_test_{}", std::process::id());
    let client = Client::with_uri_str(uri).await.unwrap();
    let coll = client.database(&database).collection::<Document>(collection);
    coll.drop(None).await.unwrap();

    if count > 0 {
        let docs: Vec<Document> = (0..count)
            .map(|i| doc! { "order_id": i, "status": if i % 2 == 0 { "active" } else { "closed" } })
            .collect();
        coll.insert_many(docs, None).await.unwrap();
    }
    (database, collection.to_string())
}

async fn connected_client(uri: &str, id: u64) -> SessionClient {
    let factory: SessionFactory = SessionFactory::default();
    let mut client = factory.new_session(SessionInfo::new(id));
    client
        .connect(uri, &ExecContext::with_timeout(Duration::from_secs(10)))
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_live_connect_and_aggregate() {
    let Some(uri) = live_uri() else {
        eprintln!("STAMPEDE_TEST_MONGO_URI not set, skipping");
        return;
    };
    let (database, collection) = seed(&uri, "orders_match", 10).await;
    let client = connected_client(&uri, 1).await;

    let response = client
        .aggregate(
            &database,
            &collection,
            doc! { "$match": { "status": "active" } },
            &ExecContext::with_timeout(Duration::from_secs(10)),
        )
        .await
        .unwrap();

    assert_eq!(response.results.len(), 5);
    assert!(response
        .results
        .iter()
        .all(|d| d.get_str("status").unwrap() == "active"));
    assert!(response.duration > Duration::ZERO);
}

#[tokio::test]
async fn test_live_empty_result() {
    let Some(uri) = live_uri() else {
        return;
    };
    let (database, collection) = seed(&uri, "orders_empty", 0).await;
    let client = connected_client(&uri, 2).await;

    let response = client
        .aggregate(&database, &collection, doc! { "$match": {} }, &ExecContext::background())
        .await
        .unwrap();

    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_live_invalid_stage_is_query_error() {
    let Some(uri) = live_uri() else {
        return;
    };
    let (database, collection) = seed(&uri, "orders_invalid", 1).await;
    let client = connected_client(&uri, 3).await;

    let err = client
        .aggregate(&database, &collection, doc! { "$notAStage": {} }, &ExecContext::background())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Query(_)));
}

#[tokio::test]
async fn test_live_unreachable_server_fails_probe() {
    if live_uri().is_none() {
        return;
    }
    let factory: SessionFactory = SessionFactory::new(MongoDialer::default());
    let mut client = factory.new_session(SessionInfo::new(4));

    let err = client
        .connect(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=500",
            &ExecContext::with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Reachability(_)));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_live_concurrent_sessions() {
    let Some(uri) = live_uri() else {
        return;
    };
    let (database, collection) = seed(&uri, "orders_concurrent", 20).await;
    let database = Arc::new(database);
    let collection = Arc::new(collection);

    let mut handles = Vec::new();
    for id in 0..8u64 {
        let uri = uri.clone();
        let database = Arc::clone(&database);
        let collection = Arc::clone(&collection);
        handles.push(tokio::spawn(async move {
            let client = connected_client(&uri, id).await;
            let response = client
                .aggregate(&database, &collection, doc! { "$match": {} }, &ExecContext::background())
                .await
                .unwrap();
            response.results.len()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 20);
    }
}

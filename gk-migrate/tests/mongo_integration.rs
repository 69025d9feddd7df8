//! Tests against a live MongoDB server.
//!
//! Run with `MONGO_URL=mongodb://localhost:27017 cargo test -- --ignored`.
//! Every test works in its own throwaway database.

use std::sync::atomic::{AtomicUsize, Ordering};

use gk_migrate::mongodb::bson::{Document, doc};
use gk_migrate::mongodb::{Client, Database};
use gk_migrate::{
    MigrateError, MigrationConfig, MigrationFuture, MigrationRegistry, MigrationStatus, MigrationStore, MongoStore,
    run_with_config,
};

static DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn test_config() -> MigrationConfig {
    let mongo_url = std::env::var("MONGO_URL").unwrap_or_else(|_| "mongodb://127.0.0.1:27017".to_string());
    let db_name = format!(
        "gk_test_{}_{}_{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis(),
        DB_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    MigrationConfig {
        mongo_url,
        db_name,
        applied_migrations_collection: "migrations".to_string(),
    }
}

async fn drop_database(config: &MigrationConfig) {
    let client = Client::with_uri_str(&config.mongo_url).await.expect("client");
    client.database(&config.db_name).drop().await.expect("drop test database");
    client.shutdown().await;
}

fn create_users(db: &Database) -> MigrationFuture<'_> {
    Box::pin(async move {
        db.create_collection("users").await?;
        Ok(())
    })
}

fn seed_admin(db: &Database) -> MigrationFuture<'_> {
    Box::pin(async move {
        db.collection::<Document>("users")
            .insert_one(doc! { "name": "admin" })
            .await?;
        Ok(())
    })
}

#[tokio::test]
#[ignore = "requires a running MongoDB (MONGO_URL)"]
async fn validator_rejects_record_without_applied_at() {
    let config = test_config();
    let store = MongoStore::connect(&config).await.unwrap();
    store.ensure_collection().await.unwrap();

    let result = store
        .handle()
        .collection::<Document>("migrations")
        .insert_one(doc! { "migration": "20241016093000_000_init" })
        .await;
    assert!(result.is_err());

    store.close().await;
    drop_database(&config).await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB (MONGO_URL)"]
async fn unique_index_rejects_second_record() {
    let config = test_config();
    let store = MongoStore::connect(&config).await.unwrap();
    store.ensure_collection().await.unwrap();
    // Ensuring twice hits the benign "already exists" paths.
    store.ensure_collection().await.unwrap();

    store.record_applied("20241016093000_000_init").await.unwrap();
    let err = store.record_applied("20241016093000_000_init").await.unwrap_err();
    assert!(matches!(err, MigrateError::Claim { .. }));

    store.close().await;
    drop_database(&config).await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB (MONGO_URL)"]
async fn claim_lifecycle() {
    let config = test_config();
    let store = MongoStore::connect(&config).await.unwrap();
    store.ensure_collection().await.unwrap();

    store.claim("20241016093000_000_init").await.unwrap();
    assert!(matches!(
        store.claim("20241016093000_000_init").await,
        Err(MigrateError::Claim { .. })
    ));
    assert!(store.applied_keys().await.unwrap().is_empty());

    store.mark_applied("20241016093000_000_init").await.unwrap();
    let records = store.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, MigrationStatus::Applied);
    assert!(!store.release("20241016093000_000_init").await.unwrap());

    store.close().await;
    drop_database(&config).await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB (MONGO_URL)"]
async fn full_run_is_idempotent() {
    let config = test_config();
    let registry = MigrationRegistry::new()
        .with("20241016093100_000_seed_admin", seed_admin)
        .and_then(|registry| registry.with("20241016093000_000_create_users", create_users))
        .unwrap();

    let first = run_with_config(&config, &registry).await.unwrap();
    assert_eq!(first.migrations_applied(), 2);

    let second = run_with_config(&config, &registry).await.unwrap();
    assert_eq!(second.migrations_applied(), 0);
    assert_eq!(second.skipped, 2);

    let client = Client::with_uri_str(&config.mongo_url).await.unwrap();
    let users = client
        .database(&config.db_name)
        .collection::<Document>("users")
        .count_documents(doc! {})
        .await
        .unwrap();
    assert_eq!(users, 1);
    client.shutdown().await;

    drop_database(&config).await;
}

#[tokio::test]
async fn unset_url_variable_is_config_error() {
    let config = MigrationConfig {
        mongo_url: "${GK_TEST_UNSET_MONGO_URL}".to_string(),
        ..test_config()
    };

    let err = MongoStore::connect(&config).await.err().unwrap();
    assert!(matches!(err, MigrateError::Config { .. }));
    assert!(err.to_string().contains("GK_TEST_UNSET_MONGO_URL"));
}

#[tokio::test]
async fn unreachable_server_is_connection_error() {
    let config = MigrationConfig {
        mongo_url: "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200".to_string(),
        ..test_config()
    };

    let err = MongoStore::connect(&config).await.err().unwrap();
    assert!(matches!(err, MigrateError::Connection { .. }));
    assert!(err.key().is_none());
}

#[tokio::test]
async fn malformed_url_is_connection_error() {
    let config = MigrationConfig {
        mongo_url: "not-a-mongodb-url".to_string(),
        ..test_config()
    };

    let err = MongoStore::connect(&config).await.err().unwrap();
    assert!(matches!(err, MigrateError::Connection { .. }));
}

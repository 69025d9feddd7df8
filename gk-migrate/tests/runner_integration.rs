//! End-to-end runs against the in-memory store.
//!
//! Migrations here are plain `fn` items, the same shape `gk generate` writes,
//! and they mutate the `MemoryDatabase` handle the runner passes them.

use gk_migrate::store::{MemoryDatabase, MemoryStore};
use gk_migrate::{MigrateError, MigrationFuture, MigrationRegistry, MigrationRunner, MigrationStore};
use serde_json::json;

fn create_users(db: &MemoryDatabase) -> MigrationFuture<'_> {
    Box::pin(async move {
        db.create_collection("users");
        Ok(())
    })
}

fn seed_admin(db: &MemoryDatabase) -> MigrationFuture<'_> {
    Box::pin(async move {
        if !db.collection_names().iter().any(|name| name == "users") {
            anyhow::bail!("users collection does not exist yet");
        }
        db.insert("users", json!({ "name": "admin", "role": "owner" }));
        Ok(())
    })
}

fn broken(_: &MemoryDatabase) -> MigrationFuture<'_> {
    Box::pin(async { Err(anyhow::anyhow!("division by zero in backfill")) })
}

fn registry() -> MigrationRegistry<MemoryDatabase> {
    // Registered out of order on purpose.
    MigrationRegistry::new()
        .with("20241016093100_000_seed_admin", seed_admin)
        .and_then(|registry| registry.with("20241016093000_000_create_users", create_users))
        .unwrap()
}

#[tokio::test]
async fn applies_migrations_in_key_order() {
    let store = MemoryStore::new("migrations");

    let report = MigrationRunner::new(&store).run(&registry()).await.unwrap();

    assert_eq!(
        report.applied,
        vec![
            "20241016093000_000_create_users".to_string(),
            "20241016093100_000_seed_admin".to_string(),
        ]
    );
    assert_eq!(store.handle().find("users"), vec![json!({ "name": "admin", "role": "owner" })]);

    let records = store.records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.is_applied()));
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let store = MemoryStore::new("migrations");
    let runner = MigrationRunner::new(&store);

    runner.run(&registry()).await.unwrap();
    let before = store.documents();

    let report = runner.run(&registry()).await.unwrap();

    assert_eq!(report.migrations_applied(), 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(store.documents(), before);
    assert_eq!(store.handle().find("users").len(), 1);
}

#[tokio::test]
async fn failure_stops_the_run_and_is_retried_later() {
    let store = MemoryStore::new("migrations");
    let failing = MigrationRegistry::new()
        .with("20241016093000_000_create_users", create_users)
        .and_then(|registry| registry.with("20241016093050_000_backfill", broken))
        .and_then(|registry| registry.with("20241016093100_000_seed_admin", seed_admin))
        .unwrap();

    let err = MigrationRunner::new(&store).run(&failing).await.unwrap_err();

    assert!(matches!(err, MigrateError::Migration { .. }));
    assert_eq!(err.key(), Some("20241016093050_000_backfill"));
    assert!(err.to_string().contains("division by zero"));

    let keys: Vec<String> = store.applied_keys().await.unwrap().into_iter().collect();
    assert_eq!(keys, vec!["20241016093000_000_create_users".to_string()]);
    assert!(store.handle().find("users").is_empty());

    // Fixed on the next deploy.
    let report = MigrationRunner::new(&store).run(&registry()).await.unwrap();
    assert_eq!(report.applied, vec!["20241016093100_000_seed_admin".to_string()]);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn records_from_earlier_versions_count_as_applied() {
    let store = MemoryStore::new("migrations");
    store.handle().create_collection("users");
    store
        .insert_raw(json!({
            "migration": "20241016093000_000_create_users",
            "applied_at": "2024-10-16T09:30:05Z",
        }))
        .unwrap();

    let report = MigrationRunner::new(&store).run(&registry()).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied, vec!["20241016093100_000_seed_admin".to_string()]);
    assert_eq!(store.records().await.unwrap().len(), 2);
}

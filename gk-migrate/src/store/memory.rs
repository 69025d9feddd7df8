//! In-process bookkeeping store.
//!
//! Mirrors the constraints of the MongoDB collection: once the collection is
//! ensured, inserts are checked against the same structural validator and the
//! unique index on `migration`. Documents are kept as JSON values, with
//! `applied_at` as an RFC 3339 string.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{APPLIED_AT_FIELD, AppliedMigration, MIGRATION_FIELD, MigrationStatus, MigrationStore, STATUS_FIELD};
use crate::errors::{BoxError, MigrateError, MigrateResult};

/// Document database handle handed to migrations run against a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    collections: Mutex<BTreeMap<String, Vec<Value>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Value>>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a document, creating the collection on first use.
    pub fn insert(&self, collection: &str, document: Value) {
        self.lock().entry(collection.to_string()).or_default().push(document);
    }

    /// Create an empty collection.
    pub fn create_collection(&self, collection: &str) {
        self.lock().entry(collection.to_string()).or_default();
    }

    /// Copy of every document in a collection.
    pub fn find(&self, collection: &str) -> Vec<Value> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

#[derive(Debug, Default)]
struct BookkeepingState {
    exists: bool,
    validated: bool,
    unique_index: bool,
    documents: Vec<Value>,
    fail_scan: bool,
    fail_mark_applied: BTreeSet<String>,
}

/// Bookkeeping store kept in memory.
#[derive(Debug)]
pub struct MemoryStore {
    db: MemoryDatabase,
    collection: String,
    state: Mutex<BookkeepingState>,
}

impl MemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            db: MemoryDatabase::new(),
            collection: collection.into(),
            state: Mutex::new(BookkeepingState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BookkeepingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a raw document into the bookkeeping collection.
    ///
    /// Validation and uniqueness apply only after [`MigrationStore::ensure_collection`].
    #[doc(hidden)]
    pub fn insert_raw(&self, document: Value) -> Result<(), BoxError> {
        let mut state = self.lock();
        if state.validated {
            validate_record(&document)?;
        }
        if state.unique_index {
            let key = document.get(MIGRATION_FIELD);
            if state.documents.iter().any(|doc| doc.get(MIGRATION_FIELD) == key) {
                return Err(format!("E11000 duplicate key error: {MIGRATION_FIELD} {key:?}").into());
            }
        }
        state.exists = true;
        state.documents.push(document);
        Ok(())
    }

    /// Seed a record as if an earlier run had applied `key`.
    pub fn seed_applied(&self, key: &str, applied_at: DateTime<Utc>) -> Result<(), BoxError> {
        self.insert_raw(record_document(key, applied_at, None))
    }

    /// Make every scan of the bookkeeping collection fail.
    #[doc(hidden)]
    pub fn fail_scans(&self, fail: bool) {
        self.lock().fail_scan = fail;
    }

    /// Make the next attempt to mark `key` applied fail.
    #[doc(hidden)]
    pub fn fail_next_mark_applied(&self, key: &str) {
        self.lock().fail_mark_applied.insert(key.to_string());
    }

    /// Raw copy of the bookkeeping documents.
    pub fn documents(&self) -> Vec<Value> {
        self.lock().documents.clone()
    }

    pub fn has_unique_index(&self) -> bool {
        self.lock().unique_index
    }
}

impl MigrationStore for MemoryStore {
    type Handle = MemoryDatabase;

    fn handle(&self) -> &MemoryDatabase {
        &self.db
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> MigrateResult<()> {
        let mut state = self.lock();
        if state.exists {
            log::debug!("bookkeeping collection '{}' already exists", self.collection);
            return Ok(());
        }
        state.exists = true;
        state.validated = true;
        state.unique_index = true;
        Ok(())
    }

    async fn records(&self) -> MigrateResult<Vec<AppliedMigration>> {
        let state = self.lock();
        if state.fail_scan {
            return Err(MigrateError::Query {
                collection: self.collection.clone(),
                source: "scan failed".into(),
            });
        }
        let mut records = state
            .documents
            .iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| MigrateError::Query {
                collection: self.collection.clone(),
                source,
            })?;
        records.sort_by(|a, b| a.migration.cmp(&b.migration));
        Ok(records)
    }

    async fn claim(&self, key: &str) -> MigrateResult<()> {
        let exists = self
            .lock()
            .documents
            .iter()
            .any(|doc| doc.get(MIGRATION_FIELD).and_then(Value::as_str) == Some(key));
        if exists {
            return Err(MigrateError::Claim { key: key.to_string() });
        }
        self.insert_raw(record_document(key, Utc::now(), Some(MigrationStatus::Running)))
            .map_err(|err| MigrateError::record(key, "failed to insert claim", Some(err)))
    }

    async fn mark_applied(&self, key: &str) -> MigrateResult<()> {
        let mut state = self.lock();
        if state.fail_mark_applied.remove(key) {
            return Err(MigrateError::record(key, "write failed", None));
        }
        let claim = state.documents.iter_mut().find(|doc| {
            doc.get(MIGRATION_FIELD).and_then(Value::as_str) == Some(key)
                && doc.get(STATUS_FIELD).and_then(Value::as_str) == Some(MigrationStatus::Running.as_str())
        });
        match claim {
            Some(doc) => {
                *doc = record_document(key, Utc::now(), Some(MigrationStatus::Applied));
                Ok(())
            }
            None => Err(MigrateError::record(key, "no running claim found", None)),
        }
    }

    async fn release(&self, key: &str) -> MigrateResult<bool> {
        let mut state = self.lock();
        let before = state.documents.len();
        state.documents.retain(|doc| {
            !(doc.get(MIGRATION_FIELD).and_then(Value::as_str) == Some(key)
                && doc.get(STATUS_FIELD).and_then(Value::as_str) == Some(MigrationStatus::Running.as_str()))
        });
        Ok(state.documents.len() < before)
    }

    async fn record_applied(&self, key: &str) -> MigrateResult<()> {
        self.insert_raw(record_document(key, Utc::now(), Some(MigrationStatus::Applied)))
            .map_err(|err| {
                if err.to_string().contains("duplicate key") {
                    MigrateError::Claim { key: key.to_string() }
                } else {
                    MigrateError::record(key, "failed to insert record", Some(err))
                }
            })
    }
}

fn record_document(key: &str, applied_at: DateTime<Utc>, status: Option<MigrationStatus>) -> Value {
    let mut doc = json!({
        MIGRATION_FIELD: key,
        APPLIED_AT_FIELD: applied_at.to_rfc3339(),
    });
    if let Some(status) = status {
        doc[STATUS_FIELD] = json!(status);
    }
    doc
}

fn validate_record(document: &Value) -> Result<(), BoxError> {
    let Some(object) = document.as_object() else {
        return Err("Document failed validation: not an object".into());
    };
    match object.get(MIGRATION_FIELD) {
        Some(Value::String(_)) => {}
        Some(_) => return Err(format!("Document failed validation: '{MIGRATION_FIELD}' must be a string").into()),
        None => return Err(format!("Document failed validation: '{MIGRATION_FIELD}' is required").into()),
    }
    match object.get(APPLIED_AT_FIELD).and_then(Value::as_str) {
        Some(raw) if DateTime::parse_from_rfc3339(raw).is_ok() => {}
        Some(_) => return Err(format!("Document failed validation: '{APPLIED_AT_FIELD}' must be a date").into()),
        None => return Err(format!("Document failed validation: '{APPLIED_AT_FIELD}' is required").into()),
    }
    if let Some(status) = object.get(STATUS_FIELD) {
        serde_json::from_value::<MigrationStatus>(status.clone())
            .map_err(|_| format!("Document failed validation: '{STATUS_FIELD}' must be running or applied"))?;
    }
    Ok(())
}

fn decode_record(document: &Value) -> Result<AppliedMigration, BoxError> {
    let migration = document
        .get(MIGRATION_FIELD)
        .and_then(Value::as_str)
        .ok_or("record is missing 'migration'")?;
    let applied_at = document
        .get(APPLIED_AT_FIELD)
        .and_then(Value::as_str)
        .ok_or("record is missing 'applied_at'")?;
    let applied_at = DateTime::parse_from_rfc3339(applied_at)?.with_timezone(&Utc);
    let status = match document.get(STATUS_FIELD) {
        Some(status) => serde_json::from_value(status.clone())?,
        None => MigrationStatus::Applied,
    };
    Ok(AppliedMigration {
        migration: migration.to_string(),
        applied_at,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validator_rejects_missing_applied_at() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();

        let err = store.insert_raw(json!({ "migration": "0001_init" })).unwrap_err();
        assert!(err.to_string().contains("'applied_at' is required"));
        assert!(store.documents().is_empty());
    }

    #[tokio::test]
    async fn test_validator_rejects_wrong_types() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();

        assert!(store.insert_raw(json!({ "migration": 1, "applied_at": Utc::now().to_rfc3339() })).is_err());
        assert!(store.insert_raw(json!({ "migration": "a", "applied_at": "yesterday" })).is_err());
        assert!(
            store
                .insert_raw(json!({ "migration": "a", "applied_at": Utc::now().to_rfc3339(), "status": "done" }))
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_record() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();

        store.seed_applied("0001_init", Utc::now()).unwrap();
        let err = store.seed_applied("0001_init", Utc::now()).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
        assert_eq!(store.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_collection_skips_existing() {
        let store = MemoryStore::new("migrations");
        store.insert_raw(json!({ "migration": "legacy" })).unwrap();

        store.ensure_collection().await.unwrap();
        assert!(!store.has_unique_index());
    }

    #[tokio::test]
    async fn test_claim_then_mark_applied() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();

        store.claim("0001_init").await.unwrap();
        assert!(store.applied_keys().await.unwrap().is_empty());
        let records = store.records().await.unwrap();
        assert_eq!(records[0].status, MigrationStatus::Running);

        store.mark_applied("0001_init").await.unwrap();
        let applied = store.applied_keys().await.unwrap();
        assert!(applied.contains("0001_init"));
        assert_eq!(store.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_conflict() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();
        store.claim("0001_init").await.unwrap();

        let err = store.claim("0001_init").await.unwrap_err();
        assert!(matches!(err, MigrateError::Claim { .. }));
    }

    #[tokio::test]
    async fn test_release_only_removes_running_claims() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();
        store.seed_applied("0001_init", Utc::now()).unwrap();
        store.claim("0002_seed").await.unwrap();

        assert!(!store.release("0001_init").await.unwrap());
        assert!(store.release("0002_seed").await.unwrap());
        assert!(!store.release("0002_seed").await.unwrap());
        assert_eq!(store.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_applied_without_claim() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();

        let err = store.mark_applied("0001_init").await.unwrap_err();
        assert!(matches!(err, MigrateError::Record { .. }));
    }

    #[tokio::test]
    async fn test_legacy_record_without_status_counts_as_applied() {
        let store = MemoryStore::new("migrations");
        store.ensure_collection().await.unwrap();
        store.seed_applied("0001_init.go", Utc::now()).unwrap();

        let applied = store.applied_keys().await.unwrap();
        assert!(applied.contains("0001_init.go"));
    }

    #[tokio::test]
    async fn test_scan_failure_is_query_error() {
        let store = MemoryStore::new("migrations");
        store.fail_scans(true);

        let err = store.applied_keys().await.unwrap_err();
        assert!(matches!(err, MigrateError::Query { .. }));
    }

    #[test]
    fn test_memory_database() {
        let db = MemoryDatabase::new();
        db.create_collection("audit");
        db.insert("users", json!({ "name": "ada" }));

        assert_eq!(db.collection_names(), vec!["audit".to_string(), "users".to_string()]);
        assert_eq!(db.find("users").len(), 1);
        assert!(db.find("missing").is_empty());
    }
}

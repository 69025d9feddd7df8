//! Bookkeeping collection in MongoDB.

use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{APPLIED_AT_FIELD, AppliedMigration, MIGRATION_FIELD, MigrationStatus, MigrationStore, STATUS_FIELD};
use crate::config::MigrationConfig;
use crate::errors::{MigrateError, MigrateResult};
use crate::project::{CONFIG_FILE, DATABASE_DIR};

/// Server error codes treated as "already done" while preparing the collection.
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_ALREADY_EXISTS: i32 = 68;
const DUPLICATE_KEY: i32 = 11000;

/// Record as stored in the bookkeeping collection.
#[derive(Debug, Serialize, Deserialize)]
struct RecordDocument {
    migration: String,
    applied_at: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<MigrationStatus>,
}

impl RecordDocument {
    fn new(key: &str, status: MigrationStatus) -> Self {
        Self {
            migration: key.to_string(),
            applied_at: bson::DateTime::now(),
            status: Some(status),
        }
    }

    fn into_record(self) -> AppliedMigration {
        let applied_at = DateTime::<Utc>::from_timestamp_millis(self.applied_at.timestamp_millis())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        AppliedMigration {
            migration: self.migration,
            applied_at,
            // Records written before claims existed carry no status.
            status: self.status.unwrap_or(MigrationStatus::Applied),
        }
    }
}

/// `$jsonSchema` validator for applied-migration records.
pub fn record_validator() -> Document {
    doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": [MIGRATION_FIELD, APPLIED_AT_FIELD],
            "properties": {
                MIGRATION_FIELD: {
                    "bsonType": "string",
                    "description": "must be a string and is required",
                },
                APPLIED_AT_FIELD: {
                    "bsonType": "date",
                    "description": "must be a date and is required",
                },
                STATUS_FIELD: {
                    "enum": [MigrationStatus::Running.as_str(), MigrationStatus::Applied.as_str()],
                    "description": "must be running or applied when present",
                },
            },
        }
    }
}

/// Server error code carried by a command or write error.
fn server_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        _ => None,
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    server_code(err) == Some(DUPLICATE_KEY)
}

/// Bookkeeping store backed by a MongoDB collection.
pub struct MongoStore {
    client: Client,
    db: Database,
    collection_name: String,
}

impl MongoStore {
    /// Connect and verify connectivity with a `ping`.
    pub async fn connect(config: &MigrationConfig) -> MigrateResult<Self> {
        let url = config
            .resolved_mongo_url()
            .map_err(|message| MigrateError::config(Path::new(DATABASE_DIR).join(CONFIG_FILE), message))?;
        let client = Client::with_uri_str(&url)
            .await
            .map_err(|err| MigrateError::Connection { source: err.into() })?;
        let db = client.database(&config.db_name);

        if let Err(err) = db.run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(MigrateError::Connection { source: err.into() });
        }
        log::debug!("connected to database '{}'", config.db_name);

        Ok(Self {
            client,
            db,
            collection_name: config.applied_migrations_collection.clone(),
        })
    }

    /// Shut down the client, releasing its connections.
    pub async fn close(self) {
        self.client.shutdown().await;
    }

    fn collection(&self) -> Collection<RecordDocument> {
        self.db.collection(&self.collection_name)
    }

    fn query_error(&self, err: mongodb::error::Error) -> MigrateError {
        MigrateError::Query {
            collection: self.collection_name.clone(),
            source: err.into(),
        }
    }

    fn schema_error(&self, message: &'static str, err: mongodb::error::Error) -> MigrateError {
        MigrateError::Schema {
            collection: self.collection_name.clone(),
            message,
            source: err.into(),
        }
    }

    async fn insert(&self, key: &str, status: MigrationStatus) -> MigrateResult<()> {
        match self.collection().insert_one(RecordDocument::new(key, status)).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(MigrateError::Claim { key: key.to_string() }),
            Err(err) => Err(MigrateError::record(key, "error inserting record", Some(err.into()))),
        }
    }
}

impl MigrationStore for MongoStore {
    type Handle = Database;

    fn handle(&self) -> &Database {
        &self.db
    }

    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn ensure_collection(&self) -> MigrateResult<()> {
        let names = self
            .db
            .list_collection_names()
            .await
            .map_err(|err| self.schema_error("error listing collections", err))?;

        if names.iter().any(|name| name == &self.collection_name) {
            log::debug!("bookkeeping collection '{}' already exists", self.collection_name);
            return Ok(());
        }

        match self
            .db
            .create_collection(&self.collection_name)
            .validator(record_validator())
            .await
        {
            Ok(()) => log::info!("created bookkeeping collection '{}'", self.collection_name),
            Err(err) if server_code(&err) == Some(NAMESPACE_EXISTS) => {
                log::debug!("bookkeeping collection '{}' created concurrently", self.collection_name);
            }
            Err(err) => return Err(self.schema_error("failed to create collection with schema", err)),
        }

        let index = IndexModel::builder()
            .keys(doc! { MIGRATION_FIELD: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        match self.collection().create_index(index).await {
            Ok(_) => Ok(()),
            Err(err) if server_code(&err) == Some(INDEX_ALREADY_EXISTS) => Ok(()),
            Err(err) => Err(self.schema_error("failed to create unique index on migration", err)),
        }
    }

    async fn records(&self) -> MigrateResult<Vec<AppliedMigration>> {
        let mut cursor = self
            .collection()
            .find(doc! {})
            .sort(doc! { MIGRATION_FIELD: 1 })
            .await
            .map_err(|err| self.query_error(err))?;

        let mut records = Vec::new();
        while cursor.advance().await.map_err(|err| self.query_error(err))? {
            let document = cursor.deserialize_current().map_err(|err| self.query_error(err))?;
            records.push(document.into_record());
        }
        Ok(records)
    }

    async fn claim(&self, key: &str) -> MigrateResult<()> {
        self.insert(key, MigrationStatus::Running).await
    }

    async fn mark_applied(&self, key: &str) -> MigrateResult<()> {
        let result = self
            .collection()
            .update_one(
                doc! { MIGRATION_FIELD: key, STATUS_FIELD: MigrationStatus::Running.as_str() },
                doc! { "$set": {
                    STATUS_FIELD: MigrationStatus::Applied.as_str(),
                    APPLIED_AT_FIELD: bson::DateTime::now(),
                } },
            )
            .await
            .map_err(|err| MigrateError::record(key, "error marking migration as applied", Some(err.into())))?;

        if result.matched_count == 0 {
            return Err(MigrateError::record(key, "no running claim found", None));
        }
        Ok(())
    }

    async fn release(&self, key: &str) -> MigrateResult<bool> {
        let result = self
            .collection()
            .delete_one(doc! { MIGRATION_FIELD: key, STATUS_FIELD: MigrationStatus::Running.as_str() })
            .await
            .map_err(|err| MigrateError::record(key, "error releasing claim", Some(err.into())))?;
        Ok(result.deleted_count > 0)
    }

    async fn record_applied(&self, key: &str) -> MigrateResult<()> {
        self.insert(key, MigrationStatus::Applied).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_requires_both_fields() {
        let validator = record_validator();
        let schema = validator.get_document("$jsonSchema").unwrap();
        let required: Vec<&str> = schema
            .get_array("required")
            .unwrap()
            .iter()
            .filter_map(|value| value.as_str())
            .collect();
        assert_eq!(required, vec!["migration", "applied_at"]);

        let properties = schema.get_document("properties").unwrap();
        assert_eq!(
            properties.get_document("applied_at").unwrap().get_str("bsonType").unwrap(),
            "date"
        );
        assert_eq!(
            properties.get_document("migration").unwrap().get_str("bsonType").unwrap(),
            "string"
        );
    }

    #[test]
    fn test_record_document_serialization() {
        let document = bson::to_document(&RecordDocument::new("0001_init", MigrationStatus::Running)).unwrap();
        assert_eq!(document.get_str("migration").unwrap(), "0001_init");
        assert_eq!(document.get_str("status").unwrap(), "running");
        assert!(document.get_datetime("applied_at").is_ok());
    }

    #[test]
    fn test_legacy_record_decodes_as_applied() {
        let legacy = doc! { "migration": "0001_init.go", "applied_at": bson::DateTime::from_millis(1_700_000_000_000) };
        let record: RecordDocument = bson::from_document(legacy).unwrap();
        let record = record.into_record();
        assert_eq!(record.status, MigrationStatus::Applied);
        assert_eq!(record.applied_at.timestamp_millis(), 1_700_000_000_000);
    }
}

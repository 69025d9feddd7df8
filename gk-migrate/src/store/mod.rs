//! Bookkeeping of applied migrations.
//!
//! This module provides the storage backends the runner records progress in:
//! - `MongoStore` - the bookkeeping collection in MongoDB
//! - `MemoryStore` - an in-process store with the same constraints

pub mod memory;
pub mod mongo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::MigrateResult;

pub use memory::{MemoryDatabase, MemoryStore};
pub use mongo::MongoStore;

/// Field holding the migration key.
pub const MIGRATION_FIELD: &str = "migration";
/// Field holding the completion (or claim) time.
pub const APPLIED_AT_FIELD: &str = "applied_at";
/// Field holding the record status.
pub const STATUS_FIELD: &str = "status";

/// Lifecycle of an applied-migration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Claimed by a runner that is executing the migration.
    Running,
    /// The migration ran to completion.
    Applied,
}

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Applied => "applied",
        }
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of the bookkeeping collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// Migration key (e.g., "20241228100000_000_init")
    pub migration: String,
    /// When the migration completed, or when it was claimed while running
    pub applied_at: DateTime<Utc>,
    pub status: MigrationStatus,
}

impl AppliedMigration {
    pub fn is_applied(&self) -> bool {
        self.status == MigrationStatus::Applied
    }
}

/// Storage for applied-migration records.
///
/// `Handle` is what migration functions receive; for MongoDB this is the
/// target database.
#[allow(async_fn_in_trait)]
pub trait MigrationStore {
    type Handle;

    /// Handle passed to migration functions.
    fn handle(&self) -> &Self::Handle;

    /// Name of the bookkeeping collection.
    fn collection_name(&self) -> &str;

    /// Create the bookkeeping collection, validator and unique index if missing.
    async fn ensure_collection(&self) -> MigrateResult<()>;

    /// All records, ordered by key.
    async fn records(&self) -> MigrateResult<Vec<AppliedMigration>>;

    /// Keys of migrations that ran to completion.
    async fn applied_keys(&self) -> MigrateResult<BTreeSet<String>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .filter(AppliedMigration::is_applied)
            .map(|record| record.migration)
            .collect())
    }

    /// Insert a `running` record for `key`. Fails with `Claim` if any record exists.
    async fn claim(&self, key: &str) -> MigrateResult<()>;

    /// Turn the `running` record for `key` into an `applied` one.
    async fn mark_applied(&self, key: &str) -> MigrateResult<()>;

    /// Delete the `running` record for `key`. Returns whether one was removed.
    async fn release(&self, key: &str) -> MigrateResult<bool>;

    /// Insert an `applied` record without running anything.
    async fn record_applied(&self, key: &str) -> MigrateResult<()>;
}

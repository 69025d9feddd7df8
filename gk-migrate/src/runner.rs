//! Migration runner for executing pending migrations.

use std::time::Instant;

use crate::errors::{MigrateError, MigrateResult};
use crate::registry::MigrationRegistry;
use crate::store::MigrationStore;

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Keys applied by this run, in execution order
    pub applied: Vec<String>,
    /// Registered migrations that were already applied
    pub skipped: usize,
    /// Total execution time in milliseconds
    pub total_time_ms: u64,
}

impl RunReport {
    pub fn migrations_applied(&self) -> usize {
        self.applied.len()
    }
}

/// Applies registered migrations that the store has not recorded yet.
pub struct MigrationRunner<'s, S> {
    store: &'s S,
}

impl<'s, S> MigrationRunner<'s, S>
where
    S: MigrationStore,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Run every pending migration in key order, stopping at the first error.
    pub async fn run(&self, registry: &MigrationRegistry<S::Handle>) -> MigrateResult<RunReport> {
        let start_time = Instant::now();
        let mut report = RunReport::default();

        self.store.ensure_collection().await?;
        let applied = self.store.applied_keys().await?;
        log::debug!(
            "{} migration(s) registered, {} recorded in '{}'",
            registry.len(),
            applied.len(),
            self.store.collection_name()
        );

        for (key, migration) in registry.iter() {
            if applied.contains(key) {
                log::debug!("skipping {key}: already applied");
                report.skipped += 1;
                continue;
            }

            self.store.claim(key).await?;

            let migration_start = Instant::now();
            log::info!("applying {key}");
            if let Err(source) = migration.up(self.store.handle()).await {
                self.release_claim(key).await;
                return Err(MigrateError::Migration {
                    key: key.to_string(),
                    source,
                });
            }

            // Without a record the next run must execute the migration again.
            if let Err(err) = self.store.mark_applied(key).await {
                self.release_claim(key).await;
                return Err(err);
            }
            log::info!("applied {key} in {}ms", migration_start.elapsed().as_millis());
            report.applied.push(key.to_string());
        }

        report.total_time_ms = start_time.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn release_claim(&self, key: &str) {
        if let Err(release_err) = self.store.release(key).await {
            log::warn!("could not release claim on {key}: {release_err}");
        }
    }
}

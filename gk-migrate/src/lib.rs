//! gk-migrate core library.
//!
//! Applies MongoDB migrations registered by generated migration files and
//! records each one in a bookkeeping collection so it runs only once.
//!
//! A project initialised with `gk init` gets a migrator binary that calls
//! [`run_migrations`] with every migration linked into it:
//!
//! ```ignore
//! #[path = "../../database/migrations/mod.rs"]
//! mod migrations;
//!
//! #[tokio::main]
//! async fn main() {
//!     env_logger::init();
//!     let registry = gk_migrate::MigrationRegistry::collect().expect("valid registry");
//!     gk_migrate::run_migrations(&registry).await.expect("migrations applied");
//! }
//! ```

pub mod config;
pub mod errors;
pub mod project;
pub mod registry;
pub mod runner;
pub mod store;

pub use config::MigrationConfig;
pub use errors::{MigrateError, MigrateResult};
pub use project::ProjectContext;
pub use registry::{Migration, MigrationFn, MigrationFuture, MigrationRegistration, MigrationRegistry};
pub use runner::{MigrationRunner, RunReport};
pub use store::{AppliedMigration, MigrationStatus, MigrationStore, MongoStore};

// Re-exported for generated migration files and `register_migration!`.
pub use inventory;
pub use log;
pub use mongodb;

use mongodb::Database;

/// Load `database/config.json` from the current project and apply pending migrations.
pub async fn run_migrations(registry: &MigrationRegistry<Database>) -> MigrateResult<RunReport> {
    let project = ProjectContext::find()?;
    let config = project.load_config()?;
    run_with_config(&config, registry).await
}

/// Apply pending migrations against the database named in `config`.
///
/// The client is shut down before returning, whatever the outcome.
pub async fn run_with_config(
    config: &MigrationConfig,
    registry: &MigrationRegistry<Database>,
) -> MigrateResult<RunReport> {
    let store = MongoStore::connect(config).await?;
    let result = MigrationRunner::new(&store).run(registry).await;
    store.close().await;
    result
}

//! Migration code generator.
//!
//! This module provides functionality to:
//! - Generate timestamped migration stubs with a registration hook
//! - Scaffold the registry module and migrator binary for `gk init`
//! - Declare new migrations in `database/migrations/mod.rs`

mod registry_updater;
mod templates;

pub use registry_updater::add_migration_module;
pub use templates::{MigrationFile, generate_migration_file, migrator_main, registry_module};

use std::path::{Path, PathBuf};

use crate::config::MigrationConfig;
use crate::errors::{MigrateError, MigrateResult};

/// Directory holding the config file and migrations, relative to the project root.
pub const DATABASE_DIR: &str = "database";
pub const CONFIG_FILE: &str = "config.json";
pub const MIGRATIONS_DIR: &str = "migrations";
/// Registry module that declares every generated migration.
pub const REGISTRY_FILE: &str = "mod.rs";
/// Migrator entry point written by `gk init`.
pub const MIGRATOR_FILE: &str = "src/bin/gk_migrate.rs";

/// Well-known paths of a project using gk migrations.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Root directory of the project (where Cargo.toml is)
    pub project_root: PathBuf,
    /// Path to the `database` directory
    pub database_dir: PathBuf,
    /// Path to `database/config.json`
    pub config_path: PathBuf,
    /// Path to `database/migrations`
    pub migrations_dir: PathBuf,
    /// Path to `database/migrations/mod.rs`
    pub registry_path: PathBuf,
    /// Path to the migrator binary source
    pub migrator_path: PathBuf,
}

impl ProjectContext {
    /// Find the project context from the current directory or its ancestors.
    pub fn find() -> MigrateResult<Self> {
        let current_dir = std::env::current_dir()
            .map_err(|err| MigrateError::config(CONFIG_FILE, format!("failed to get current directory: {err}")))?;
        Self::find_from(&current_dir)
    }

    /// Find the project context starting from the given directory.
    pub fn find_from(start: &Path) -> MigrateResult<Self> {
        let project_root = Self::find_project_root(start)?;
        Ok(Self::from_root(project_root))
    }

    /// Create a context from a known project root.
    pub fn from_root(project_root: PathBuf) -> Self {
        let database_dir = project_root.join(DATABASE_DIR);
        let migrations_dir = database_dir.join(MIGRATIONS_DIR);
        Self {
            config_path: database_dir.join(CONFIG_FILE),
            registry_path: migrations_dir.join(REGISTRY_FILE),
            migrator_path: project_root.join(MIGRATOR_FILE),
            database_dir,
            migrations_dir,
            project_root,
        }
    }

    fn find_project_root(start: &Path) -> MigrateResult<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join("Cargo.toml").exists() {
                return Ok(current);
            }

            if !current.pop() {
                return Err(MigrateError::config(
                    start.join(DATABASE_DIR).join(CONFIG_FILE),
                    format!("could not find Cargo.toml in {start:?} or any parent directory"),
                ));
            }
        }
    }

    /// Check whether `gk init` has been run for this project.
    pub fn is_initialized(&self) -> bool {
        self.config_path.exists() && self.migrations_dir.is_dir()
    }

    /// Load the project's connection configuration.
    pub fn load_config(&self) -> MigrateResult<MigrationConfig> {
        MigrationConfig::load(&self.config_path)
    }
}

use anyhow::{Context, Result};
use clap::Args;
use gk_migrate::{MigrationConfig, ProjectContext};
use std::path::{Path, PathBuf};

use crate::examples::ExampleGroup;
use crate::generator::{migrator_main, registry_module};
use crate::output::OutputManager;
use crate::theme::ICONS;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Initialize",
        commands: &[
            "gk init                                   # Use the default local connection",
            "gk init --db-name app --collection schema_migrations",
        ],
    },
    ExampleGroup {
        title: "Keep Secrets Out Of The Config",
        commands: &[
            "gk init --mongo-url '${MONGO_URL}'        # Expanded from the environment at run time",
        ],
    },
];

const MONGO_URL_VAR: &str = "MONGO_URL";

#[derive(Args)]
pub struct InitArgs {
    /// MongoDB connection URL (may reference ${VAR}); defaults to ${MONGO_URL} when that is set
    #[arg(long)]
    pub mongo_url: Option<String>,

    /// Target database name
    #[arg(long)]
    pub db_name: Option<String>,

    /// Collection that records applied migrations
    #[arg(long)]
    pub collection: Option<String>,
}

impl InitArgs {
    fn into_config(self) -> MigrationConfig {
        let defaults = MigrationConfig::default();
        // Keep the reference, not the value, so credentials stay out of the file.
        let mongo_url = self.mongo_url.unwrap_or_else(|| {
            if std::env::var_os(MONGO_URL_VAR).is_some() {
                format!("${{{MONGO_URL_VAR}}}")
            } else {
                defaults.mongo_url
            }
        });
        MigrationConfig {
            mongo_url,
            db_name: self.db_name.unwrap_or(defaults.db_name),
            applied_migrations_collection: self
                .collection
                .unwrap_or(defaults.applied_migrations_collection),
        }
    }
}

/// Files touched by `gk init`.
#[derive(Debug, Default)]
pub struct InitOutcome {
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

pub async fn handle_init(args: InitArgs, output: &OutputManager) -> Result<()> {
    let ctx = ProjectContext::find()?;
    let config = args.into_config();

    output.heading("Initialize gk migrations");
    output.key_value("Project", &ctx.project_root.display().to_string());
    output.key_value("Database", &config.db_name);
    output.key_value("Collection", &config.applied_migrations_collection);

    let outcome = init_project(&ctx, &config)?;

    if !outcome.created.is_empty() {
        output.success("Created:");
    }
    for path in &outcome.created {
        let icon = if path.is_dir() { ICONS.folder } else { ICONS.file };
        output.indented(icon, &relative(&ctx.project_root, path));
    }
    for path in &outcome.skipped {
        output.warning(&format!(
            "Skipped: {} (already exists)",
            relative(&ctx.project_root, path)
        ));
    }

    output.heading("Next steps");
    output.indented(ICONS.arrow, "Add dependencies: gk-migrate, tokio (features = [\"full\"]), env_logger");
    output.indented(ICONS.arrow, "Create a migration: gk generate <description>");
    output.indented(ICONS.arrow, "Apply migrations: cargo run --bin gk_migrate");

    Ok(())
}

/// Create the config, migrations directory, registry module and migrator.
///
/// Existing files are left untouched.
pub fn init_project(ctx: &ProjectContext, config: &MigrationConfig) -> Result<InitOutcome> {
    let mut outcome = InitOutcome::default();

    if !ctx.migrations_dir.is_dir() {
        std::fs::create_dir_all(&ctx.migrations_dir)
            .context("Failed to create migrations directory")?;
        outcome.created.push(ctx.migrations_dir.clone());
    }

    if ctx.config_path.exists() {
        outcome.skipped.push(ctx.config_path.clone());
    } else {
        config.save(&ctx.config_path)?;
        outcome.created.push(ctx.config_path.clone());
    }

    write_if_missing(&ctx.registry_path, &registry_module(), &mut outcome)?;
    write_if_missing(&ctx.migrator_path, &migrator_main(), &mut outcome)?;

    log::debug!(
        "init created {} path(s), skipped {}",
        outcome.created.len(),
        outcome.skipped.len()
    );

    Ok(outcome)
}

fn write_if_missing(path: &Path, content: &str, outcome: &mut InitOutcome) -> Result<()> {
    if path.exists() {
        outcome.skipped.push(path.to_path_buf());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    outcome.created.push(path.to_path_buf());
    Ok(())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

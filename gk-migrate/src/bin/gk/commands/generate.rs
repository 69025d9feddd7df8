use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use gk_migrate::ProjectContext;

use crate::examples::ExampleGroup;
use crate::generator::{MigrationFile, add_migration_module, generate_migration_file};
use crate::output::OutputManager;
use crate::utils::sanitize_description;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Generate Migrations",
    commands: &[
        "gk generate init                 # Create the first migration",
        "gk generate \"add user index\"     # Description becomes add_user_index",
    ],
}];

#[derive(Args)]
pub struct GenerateArgs {
    /// What the migration does (e.g., add_users, split_name)
    pub description: String,
}

pub async fn handle_generate(args: GenerateArgs, output: &OutputManager) -> Result<()> {
    let ctx = super::initialized_project(output)?;

    output.heading("Generate Migration");

    let migration = create_migration(&ctx, &args.description, Utc::now())?;

    output.success(&format!("Created: database/migrations/{}", migration.filename));
    output.key_value("Key", &migration.key);
    output.bullet("Updated: database/migrations/mod.rs");

    output.info("Next steps:");
    output.bullet("Implement the migration's up function");
    output.bullet("Run 'cargo run --bin gk_migrate' to apply");

    Ok(())
}

/// Write a new migration stub and declare it in the registry module.
pub fn create_migration(
    ctx: &ProjectContext,
    description: &str,
    timestamp: DateTime<Utc>,
) -> Result<MigrationFile> {
    let Some(description) = sanitize_description(description) else {
        anyhow::bail!("Migration description must contain at least one letter or digit");
    };

    let migration = generate_migration_file(&description, timestamp);
    let migration_path = ctx.migrations_dir.join(&migration.filename);

    if migration_path.exists() {
        anyhow::bail!("Migration file already exists: {}", migration_path.display());
    }

    std::fs::create_dir_all(&ctx.migrations_dir).context("Failed to create migrations directory")?;
    std::fs::write(&migration_path, &migration.content)
        .with_context(|| format!("Failed to write migration: {}", migration_path.display()))?;

    add_migration_module(&ctx.registry_path, &migration.module_name)
        .context("Failed to update database/migrations/mod.rs")?;

    log::debug!("generated migration {}", migration.key);

    Ok(migration)
}

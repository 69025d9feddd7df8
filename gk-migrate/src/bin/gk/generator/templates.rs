//! Code generation for migration files and project scaffolding.

use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Generated migration file
#[derive(Debug)]
pub struct MigrationFile {
    /// Filename (without path)
    pub filename: String,
    /// Module name (valid Rust identifier)
    pub module_name: String,
    /// Registration key recorded in the bookkeeping collection
    pub key: String,
    /// Full file content
    pub content: String,
}

/// Timestamp prefix shared by the key and the filename, e.g. `20241016093000_123`.
pub fn migration_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d%H%M%S_%3f").to_string()
}

/// Generate a migration stub for an already sanitized description.
pub fn generate_migration_file(description: &str, timestamp: DateTime<Utc>) -> MigrationFile {
    let key = format!("{}_{description}", migration_timestamp(timestamp));
    let module_name = format!("_{key}");
    let filename = format!("{module_name}.rs");

    let mut content = String::new();
    let _ = writeln!(content, "// Migration: {description}");
    let _ = writeln!(content, "// Generated: {}", timestamp.format("%Y-%m-%dT%H:%M:%SZ"));
    let _ = writeln!(content);
    let _ = writeln!(content, "use gk_migrate::mongodb::Database;");
    let _ = writeln!(content, "use gk_migrate::{{MigrationFuture, register_migration}};");
    let _ = writeln!(content);
    let _ = writeln!(content, "register_migration!(\"{key}\", up);");
    let _ = writeln!(content);
    let _ = writeln!(content, "pub fn up(db: &Database) -> MigrationFuture<'_> {{");
    let _ = writeln!(content, "    Box::pin(async move {{");
    let _ = writeln!(content, "        gk_migrate::log::info!(\"Running {key} migration on {{}}\", db.name());");
    let _ = writeln!(content);
    let _ = writeln!(content, "        // Write your migration logic here");
    let _ = writeln!(content, "        Ok(())");
    let _ = writeln!(content, "    }})");
    let _ = writeln!(content, "}}");

    MigrationFile {
        filename,
        module_name,
        key,
        content,
    }
}

/// Contents of `database/migrations/mod.rs` for a fresh project.
pub fn registry_module() -> String {
    let mut content = String::new();
    let _ = writeln!(content, "// Migration registry.");
    let _ = writeln!(content, "//");
    let _ = writeln!(
        content,
        "// Every migration generated by `gk generate` is declared below and registers"
    );
    let _ = writeln!(content, "// itself with `register_migration!`. Do not remove these declarations.");
    let _ = writeln!(content);
    content
}

/// Contents of the migrator binary that applies pending migrations.
pub fn migrator_main() -> String {
    r#"// Applies pending database migrations. Generated by `gk init`.

#[path = "../../database/migrations/mod.rs"]
mod migrations;

use gk_migrate::{MigrationRegistry, run_migrations};

#[tokio::main]
async fn main() {
    env_logger::init();

    let result = match MigrationRegistry::collect() {
        Ok(registry) => run_migrations(&registry).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(report) => println!(
            "Migrations applied successfully! ({} applied, {} already up to date)",
            report.migrations_applied(),
            report.skipped
        ),
        Err(err) => {
            gk_migrate::log::error!("Migration failed: {err}");
            eprintln!("Migration failed: {err}");
            std::process::exit(1);
        }
    }
}
"#
    .to_string()
}

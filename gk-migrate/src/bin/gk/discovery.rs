//! Discovery of generated migration files on disk.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static REGISTRATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"register_migration!\s*\(\s*"([^"]+)""#).expect("registration pattern is valid")
});

/// Migration file found in the migrations directory.
#[derive(Debug, Clone)]
pub struct MigrationSource {
    /// Registration key (e.g., "20241228100000_000_init")
    pub key: String,
    /// Filename (e.g., "_20241228100000_000_init.rs")
    pub filename: String,
    pub path: PathBuf,
}

/// List migration files, sorted by key.
///
/// The key comes from the file's `register_migration!` call, falling back to
/// the filename without its leading underscore.
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationSource>> {
    let mut migrations = Vec::new();

    if !migrations_dir.exists() {
        return Ok(migrations);
    }

    let entries = std::fs::read_dir(migrations_dir).context("Failed to read migrations directory")?;

    for entry in entries {
        let path = entry?.path();

        if path.extension().is_none_or(|ext| ext != "rs") {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if filename == "mod.rs" {
            continue;
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read migration: {}", path.display()))?;
        let key = registration_key(&content).unwrap_or_else(|| {
            let stem = filename.trim_end_matches(".rs");
            stem.strip_prefix('_').unwrap_or(stem).to_string()
        });

        migrations.push(MigrationSource { key, filename, path });
    }

    migrations.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(migrations)
}

fn registration_key(content: &str) -> Option<String> {
    REGISTRATION
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|key| key.as_str().to_string())
}

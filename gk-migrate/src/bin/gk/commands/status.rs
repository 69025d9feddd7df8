use anyhow::{Context, Result};
use colored::Color;
use comfy_table::Cell;
use gk_migrate::{AppliedMigration, MigrationStatus, MigrationStore, MongoStore};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::discovery::{MigrationSource, discover_migrations};
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};
use crate::theme::THEME;
use crate::utils::format_datetime;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Migration Status",
    commands: &[
        "gk status                        # Show applied and pending migrations",
        "gk status --output json          # Machine-readable status",
    ],
}];

/// State of a migration key across the filesystem and the bookkeeping collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Applied,
    Running,
    Pending,
    /// Recorded in the database but no file declares it.
    Orphaned,
}

impl MigrationState {
    fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Running => "running",
            Self::Pending => "pending",
            Self::Orphaned => "orphaned",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Applied => THEME.success,
            Self::Running => THEME.warning,
            Self::Pending => THEME.highlight,
            Self::Orphaned => THEME.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MigrationStatusEntry {
    pub key: String,
    pub state: MigrationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub collection: String,
    pub migrations: Vec<MigrationStatusEntry>,
}

impl StatusReport {
    pub fn count(&self, state: MigrationState) -> usize {
        self.migrations.iter().filter(|m| m.state == state).count()
    }
}

impl TableDisplay for StatusReport {
    fn to_table(&self, output: &OutputManager) -> comfy_table::Table {
        let mut table = output.create_table();
        output.add_table_header(&mut table, &["Migration", "State", "Applied At", "File"]);

        for entry in &self.migrations {
            table.add_row(vec![
                Cell::new(&entry.key),
                output.color_cell(Cell::new(entry.state.label()), entry.state.color()),
                Cell::new(entry.applied_at.as_deref().unwrap_or("-")),
                Cell::new(entry.file.as_deref().unwrap_or("-")),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        self.migrations
            .iter()
            .map(|entry| format!("{}={}", entry.key, entry.state.label()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub async fn handle_status(output: &OutputManager) -> Result<()> {
    let ctx = super::initialized_project(output)?;
    let config = ctx.load_config()?;

    output.heading("Migration Status");

    let sources = discover_migrations(&ctx.migrations_dir).context("Failed to discover migration files")?;
    output.verbose(&format!("Found {} migration file(s)", sources.len()));
    for source in &sources {
        output.verbose(&format!("{} ({})", source.key, source.path.display()));
    }

    output.progress("Connecting to MongoDB");
    let store = MongoStore::connect(&config).await;
    output.clear_line();
    let store = store?;

    let records = store.records().await;
    store.close().await;
    let records = records?;

    let report = build_report(config.applied_migrations_collection, &sources, records);

    if report.migrations.is_empty() {
        output.info("No migrations found. Create one with 'gk generate <description>'.");
        return Ok(());
    }

    output.display(&report)?;

    output.key_value("Applied", &report.count(MigrationState::Applied).to_string());
    output.key_value("Pending", &report.count(MigrationState::Pending).to_string());

    let running = report.count(MigrationState::Running);
    if running > 0 {
        output.warning(&format!(
            "{running} migration(s) claimed but not finished. If no migrator is running, clear with 'gk resolve <key> --release'."
        ));
    }

    let orphaned = report.count(MigrationState::Orphaned);
    if orphaned > 0 {
        output.warning(&format!("{orphaned} recorded migration(s) have no matching file"));
    }

    Ok(())
}

/// Merge migration files and bookkeeping records into one key-ordered report.
pub fn build_report(
    collection: String,
    sources: &[MigrationSource],
    records: Vec<AppliedMigration>,
) -> StatusReport {
    let mut by_key: BTreeMap<String, MigrationStatusEntry> = sources
        .iter()
        .map(|source| {
            let entry = MigrationStatusEntry {
                key: source.key.clone(),
                state: MigrationState::Pending,
                file: Some(source.filename.clone()),
                applied_at: None,
            };
            (source.key.clone(), entry)
        })
        .collect();

    for record in records {
        let state = match record.status {
            MigrationStatus::Applied => MigrationState::Applied,
            MigrationStatus::Running => MigrationState::Running,
        };
        let applied_at = Some(format_datetime(record.applied_at));

        by_key
            .entry(record.migration.clone())
            .and_modify(|entry| {
                entry.state = state;
                entry.applied_at = applied_at.clone();
            })
            .or_insert_with(|| MigrationStatusEntry {
                key: record.migration,
                state: if state == MigrationState::Running {
                    MigrationState::Running
                } else {
                    MigrationState::Orphaned
                },
                file: None,
                applied_at,
            });
    }

    StatusReport {
        collection,
        migrations: by_key.into_values().collect(),
    }
}

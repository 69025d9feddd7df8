use anyhow::{Context, Result};
use clap::Args;
use gk_migrate::{MigrateError, MigrationStore, MongoStore};

use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Recovery",
    commands: &[
        "gk resolve 20241016093000_000_init --applied   # Record as applied without running it",
        "gk resolve 20241016093000_000_init --release   # Drop a stale running claim",
    ],
}];

#[derive(Args)]
pub struct ResolveArgs {
    /// Migration key to resolve
    pub key: String,

    /// Record the migration as applied without running it
    #[arg(long, conflicts_with = "release", required_unless_present = "release")]
    pub applied: bool,

    /// Delete a stale running claim so the migration can run again
    #[arg(long, conflicts_with = "applied")]
    pub release: bool,
}

/// What `gk resolve` did to the bookkeeping collection.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    MarkedApplied,
    AlreadyRecorded,
    Released,
    NoClaim,
}

pub async fn handle_resolve(args: ResolveArgs, output: &OutputManager) -> Result<()> {
    let ctx = super::initialized_project(output)?;
    let config = ctx.load_config()?;

    output.heading(&format!("Resolve Migration: {}", args.key));

    output.progress("Connecting to MongoDB");
    let store = MongoStore::connect(&config).await;
    output.clear_line();
    let store = store.context("Failed to connect to MongoDB")?;

    let result = resolve(&store, &args.key, args.applied).await;
    store.close().await;

    match result? {
        Resolution::MarkedApplied => output.success(&format!("Marked '{}' as applied", args.key)),
        Resolution::AlreadyRecorded => {
            output.warning(&format!("Migration '{}' already has a record", args.key));
        }
        Resolution::Released => output.success(&format!("Released claim on '{}'", args.key)),
        Resolution::NoClaim => {
            output.warning(&format!("Migration '{}' has no running claim", args.key));
        }
    }

    Ok(())
}

/// Record `key` as applied, or release its running claim.
pub async fn resolve<S: MigrationStore>(store: &S, key: &str, applied: bool) -> Result<Resolution> {
    if !applied {
        let released = store.release(key).await?;
        return Ok(if released {
            Resolution::Released
        } else {
            Resolution::NoClaim
        });
    }

    store.ensure_collection().await?;
    match store.record_applied(key).await {
        Ok(()) => Ok(Resolution::MarkedApplied),
        Err(MigrateError::Claim { .. }) => Ok(Resolution::AlreadyRecorded),
        Err(err) => Err(err.into()),
    }
}

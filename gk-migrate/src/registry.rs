//! Ordered registry of migration functions.
//!
//! Keys are timestamp-prefixed, so iterating the registry in key order runs
//! migrations in the order they were generated. Generated migration files
//! register themselves with [`register_migration!`](crate::register_migration),
//! and [`MigrationRegistry::collect`] gathers every registration linked into
//! the binary.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use mongodb::Database;

use crate::errors::{MigrateError, MigrateResult};

/// Future returned by a migration function.
pub type MigrationFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Signature of a generated migration's `up` function.
pub type MigrationFn = for<'a> fn(&'a Database) -> MigrationFuture<'a>;

/// A one-way unit of database change.
pub trait Migration<H>: Send + Sync {
    fn up<'a>(&'a self, db: &'a H) -> MigrationFuture<'a>;
}

impl<H, F> Migration<H> for F
where
    F: for<'a> Fn(&'a H) -> MigrationFuture<'a> + Send + Sync,
{
    fn up<'a>(&'a self, db: &'a H) -> MigrationFuture<'a> {
        self(db)
    }
}

/// Link-time registration submitted by [`register_migration!`](crate::register_migration).
pub struct MigrationRegistration {
    pub key: &'static str,
    pub up: MigrationFn,
}

impl MigrationRegistration {
    pub const fn new(key: &'static str, up: MigrationFn) -> Self {
        Self { key, up }
    }
}

inventory::collect!(MigrationRegistration);

/// Registrations linked into the current binary, in no particular order.
pub fn registered_migrations() -> impl Iterator<Item = &'static MigrationRegistration> {
    inventory::iter::<MigrationRegistration>()
}

/// Migrations keyed by a unique identifier, iterated in key order.
pub struct MigrationRegistry<H> {
    entries: BTreeMap<String, Box<dyn Migration<H>>>,
}

impl<H> Default for MigrationRegistry<H> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<H> MigrationRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a migration. Empty and duplicate keys are rejected.
    pub fn register<M>(&mut self, key: impl Into<String>, migration: M) -> MigrateResult<()>
    where
        M: Migration<H> + 'static,
    {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(MigrateError::Registry {
                key,
                message: "key must not be empty",
            });
        }
        if self.entries.contains_key(&key) {
            return Err(MigrateError::Registry {
                key,
                message: "key is already registered",
            });
        }
        self.entries.insert(key, Box::new(migration));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<M>(mut self, key: impl Into<String>, migration: M) -> MigrateResult<Self>
    where
        M: Migration<H> + 'static,
    {
        self.register(key, migration)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys in execution order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Registered migrations in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &(dyn Migration<H> + 'static))> {
        self.entries
            .iter()
            .map(|(key, migration)| (key.as_str(), migration.as_ref()))
    }
}

impl MigrationRegistry<Database> {
    /// Build a registry from every `register_migration!` linked into the binary.
    pub fn collect() -> MigrateResult<Self> {
        let mut registry = Self::new();
        for registration in registered_migrations() {
            registry.register(registration.key, registration.up)?;
        }
        Ok(registry)
    }
}

impl<H> std::fmt::Debug for MigrationRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// Register a migration function under a key.
///
/// ```ignore
/// use gk_migrate::{register_migration, MigrationFuture};
/// use gk_migrate::mongodb::Database;
///
/// register_migration!("20241016093000_000_add_users", up);
///
/// pub fn up(db: &Database) -> MigrationFuture<'_> {
///     Box::pin(async move {
///         db.create_collection("users").await?;
///         Ok(())
///     })
/// }
/// ```
#[macro_export]
macro_rules! register_migration {
    ($key:expr, $up:path) => {
        $crate::inventory::submit! {
            $crate::MigrationRegistration::new($key, $up)
        }
    };
}

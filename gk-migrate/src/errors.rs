use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used for failures reported by a bookkeeping backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type returned by the migration runner and stores.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Configuration resource missing, unreadable, or malformed.
    #[error("failed to load config from {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// The database could not be reached.
    #[error("failed to connect to MongoDB: {source}")]
    Connection {
        #[source]
        source: BoxError,
    },

    /// The bookkeeping collection or its unique index could not be created.
    #[error("failed to prepare bookkeeping collection '{collection}': {message}: {source}")]
    Schema {
        collection: String,
        message: &'static str,
        #[source]
        source: BoxError,
    },

    /// Applied-migration records could not be read.
    #[error("failed to read applied migrations from '{collection}': {source}")]
    Query {
        collection: String,
        #[source]
        source: BoxError,
    },

    /// A migration function reported failure.
    #[error("error applying migration {key}: {source:#}")]
    Migration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The migration ran but its record could not be written.
    #[error("failed to mark migration {key} as applied: {message}")]
    Record {
        key: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Another runner already holds the record for this key.
    #[error("migration {key} is claimed by another runner (run 'gk resolve {key} --release' if it is stale)")]
    Claim { key: String },

    /// Invalid registration supplied to the registry.
    #[error("invalid migration registration '{key}': {message}")]
    Registry { key: String, message: &'static str },
}

impl MigrateError {
    /// Migration key this error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Migration { key, .. }
            | Self::Record { key, .. }
            | Self::Claim { key }
            | Self::Registry { key, .. } => Some(key.as_str()),
            _ => None,
        }
    }

    pub(crate) fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn record(key: &str, message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Record {
            key: key.to_string(),
            message: message.into(),
            source,
        }
    }
}

/// Convenience alias for results produced by this crate.
pub type MigrateResult<T> = Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_mentions_key_and_cause() {
        let err = MigrateError::Migration {
            key: "20241016093000_000_add_users".to_string(),
            source: anyhow::anyhow!("index build failed"),
        };
        let message = err.to_string();
        assert!(message.contains("20241016093000_000_add_users"));
        assert!(message.contains("index build failed"));
        assert_eq!(err.key(), Some("20241016093000_000_add_users"));
    }

    #[test]
    fn test_connection_error_has_no_key() {
        let err = MigrateError::Connection {
            source: "server selection timeout".into(),
        };
        assert_eq!(err.key(), None);
        assert!(err.to_string().contains("server selection timeout"));
    }

    #[test]
    fn test_record_error_without_source() {
        let err = MigrateError::record("0001_init", "no running claim found", None);
        assert_eq!(
            err.to_string(),
            "failed to mark migration 0001_init as applied: no running claim found"
        );
    }
}

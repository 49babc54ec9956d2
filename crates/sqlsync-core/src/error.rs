use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::migration::Direction;

/// Core error type for sqlsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration directory error: {0}")]
    Directory(String),

    #[error("Failed to read migration file {}: {reason}", path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("Connection operation failed: {0}")]
    ConnectionOperation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration \"{name}\" has no {direction} query")]
    MissingQuery { name: String, direction: Direction },

    #[error("The migration directory is corrupt, the following files are missing: {}", .0.join(", "))]
    CorruptMigrations(Vec<String>),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl SyncError {
    /// Whether this error aborts a run before any connection is touched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::Directory(_) | SyncError::FileRead { .. }
        )
    }
}

/// Result type alias using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_are_fatal() {
        assert!(SyncError::Config("bad".into()).is_fatal());
        assert!(SyncError::Directory("gone".into()).is_fatal());
        assert!(SyncError::FileRead {
            path: PathBuf::from("migrations/001_init.up.sql"),
            reason: "permission denied".into(),
        }
        .is_fatal());
        assert!(!SyncError::Database("connection refused".into()).is_fatal());
        assert!(!SyncError::Timeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = SyncError::MissingQuery {
            name: "002_add_col".into(),
            direction: Direction::Down,
        };
        assert_eq!(err.to_string(), "Migration \"002_add_col\" has no down query");

        let err = SyncError::CorruptMigrations(vec!["001_init".into(), "003_drop".into()]);
        assert_eq!(
            err.to_string(),
            "The migration directory is corrupt, the following files are missing: 001_init, 003_drop"
        );

        let err = SyncError::FileRead {
            path: PathBuf::from("m/001_init.up.sql"),
            reason: "stream did not contain valid UTF-8".into(),
        };
        assert!(err.to_string().contains("m/001_init.up.sql"));
    }
}

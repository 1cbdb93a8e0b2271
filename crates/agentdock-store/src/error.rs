//! Error types for the persistent store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No migration script exists for the requested version.
    #[error("no migration script found for version {version}")]
    MigrationMissing {
        /// The version that was requested.
        version: String,
    },

    /// A migration ran without error but the schema version row did not
    /// advance to the expected value afterward.
    #[error("migration to {expected} did not take effect (schema_metadata still reports {actual})")]
    MigrationVerifyFailed {
        /// The version the migration was supposed to reach.
        expected: String,
        /// The version actually observed afterward.
        actual: String,
    },

    /// `rollback(version)` was called but no backup file exists for that version.
    #[error("no backup found for version {version} at {}", path.display())]
    BackupMissing {
        /// The version that was requested.
        version: String,
        /// The backup path that was probed.
        path: PathBuf,
    },

    /// An underlying sqlite error.
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An underlying I/O error (e.g. while copying a backup file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

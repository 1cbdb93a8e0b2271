//! The [`Store`] handle: a single-writer sqlite connection behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::StoreError;
use crate::migrations;

/// A schema-versioned, single-writer store. All access goes through
/// [`Store::with_conn`], which serializes callers on an internal mutex —
/// the same "only shared mutable state flows through transactions"
/// guarantee spec.md §5 requires.
pub struct Store {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Store {
    /// Open (or create) the database at `path`, expanding a leading `~` the
    /// way spec.md §6 describes, and migrate it to the latest schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::migrate_to_latest(&mut conn, path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Open an in-memory store, for tests and short-lived harness runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::migrate_to_latest(&mut conn, Path::new(":memory:"))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` with exclusive access to the connection inside a transaction,
    /// committing on `Ok` and rolling back on `Err`.
    pub fn with_txn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = guard.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Run `f` with exclusive access to the connection, no transaction
    /// wrapping (for read-only queries).
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }

    /// Current schema version.
    pub fn schema_version(&self) -> Result<String, StoreError> {
        self.with_conn(|conn| migrations::current_version(conn))
    }

    /// Restore from the pre-migration backup for `version` and reopen.
    pub fn rollback_to(&self, version: &str) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        migrations::rollback(&mut guard, &self.db_path, version)
    }
}

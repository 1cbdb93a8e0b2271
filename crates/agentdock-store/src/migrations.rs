//! Linear schema migration runner.
//!
//! Migrations are embedded SQL scripts keyed by a monotonic semver string.
//! `migrate_to_latest` computes the ordered set of versions strictly greater
//! than the current one and applies them in sequence, each under its own
//! transaction, writing a file-level backup of the database immediately
//! before each step and verifying the schema version advanced as expected
//! afterward.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::StoreError;

/// One migration step: a target version and the SQL to reach it.
pub struct Migration {
    pub version: &'static str,
    pub sql: &'static str,
}

/// All migrations in application order. The runner filters to those greater
/// than the current version, so this list never needs reordering.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0.1.0",
        sql: r"
            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                pid INTEGER NOT NULL,
                repo_path TEXT NOT NULL,
                worktree_path TEXT NOT NULL,
                worktree_name TEXT,
                is_main_repo INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_heartbeat_at TEXT NOT NULL,
                execution_mode TEXT NOT NULL,
                sandbox_id TEXT,
                prompt TEXT,
                status TEXT,
                output_log TEXT,
                budget_limit REAL,
                estimated_cost REAL,
                actual_cost REAL,
                template_name TEXT,
                git_user TEXT,
                git_email TEXT,
                ssh_key_provided INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE file_claims (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                repo_path TEXT NOT NULL,
                file_path TEXT NOT NULL,
                mode TEXT NOT NULL,
                claimed_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                active INTEGER NOT NULL,
                escalated_from TEXT,
                reason TEXT
            );
            CREATE INDEX idx_file_claims_repo_file ON file_claims(repo_path, file_path);
            CREATE INDEX idx_file_claims_session ON file_claims(session_id);
        ",
    },
    Migration {
        version: "0.2.0",
        sql: r"
            CREATE TABLE conflict_resolutions (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                conflict_type TEXT NOT NULL,
                strategy TEXT NOT NULL,
                confidence REAL NOT NULL,
                detected_at TEXT NOT NULL,
                resolved_at TEXT,
                auto_fix_suggestion_id TEXT
            );
            CREATE TABLE auto_fix_suggestions (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                conflict_type TEXT NOT NULL,
                strategy TEXT NOT NULL,
                confidence REAL NOT NULL,
                explanation TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                applied_at TEXT,
                auto_applied INTEGER NOT NULL
            );
        ",
    },
    Migration {
        version: "1.0.0",
        sql: r"
            CREATE TABLE merge_subscriptions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                repo_path TEXT NOT NULL,
                branch_name TEXT NOT NULL,
                target_branch TEXT NOT NULL,
                satisfied INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE merge_events (
                id TEXT PRIMARY KEY,
                repo_path TEXT NOT NULL,
                branch_name TEXT NOT NULL,
                target_branch TEXT NOT NULL,
                merged_at TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                source_commit TEXT NOT NULL,
                notification_sent INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE budget_tracking (
                period TEXT NOT NULL,
                period_start TEXT NOT NULL,
                budget_limit REAL NOT NULL,
                spent REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (period, period_start)
            );
        ",
    },
    Migration {
        version: "1.1.0",
        sql: r"
            CREATE TABLE cleanup_gates (
                name TEXT PRIMARY KEY,
                last_run_at TEXT NOT NULL
            );
        ",
    },
];

/// Version recorded in `schema_metadata` before any migration has run.
pub const UNVERSIONED: &str = "0.0.0";

/// Ensure `schema_metadata` exists, seeded at [`UNVERSIONED`] if freshly created.
pub fn ensure_schema_metadata(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
    )?;
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM schema_metadata WHERE key = 'version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        conn.execute(
            "INSERT INTO schema_metadata (key, value) VALUES ('version', ?1)",
            [UNVERSIONED],
        )?;
    }
    Ok(())
}

/// Read the current schema version.
pub fn current_version(conn: &Connection) -> Result<String, StoreError> {
    let version: String = conn.query_row(
        "SELECT value FROM schema_metadata WHERE key = 'version'",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Compare two dotted version strings numerically, component by component.
fn version_gt(a: &str, b: &str) -> bool {
    version_parts(a) > version_parts(b)
}

fn version_parts(v: &str) -> Vec<u64> {
    v.split('.').map(|p| p.parse().unwrap_or(0)).collect()
}

fn backup_path(db_path: &Path, version: &str) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store.db".to_owned());
    name.push_str(&format!(".v{version}.backup"));
    db_path.with_file_name(name)
}

/// Apply every migration whose version is strictly greater than the current
/// one, in ascending order. Idempotent: running twice in succession is a
/// no-op the second time because no migration's version exceeds `latest`.
pub fn migrate_to_latest(conn: &mut Connection, db_path: &Path) -> Result<String, StoreError> {
    ensure_schema_metadata(conn)?;
    let mut current = current_version(conn)?;

    let mut pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| version_gt(m.version, &current))
        .collect();
    pending.sort_by(|a, b| version_parts(a.version).cmp(&version_parts(b.version)));

    for migration in pending {
        let backup = backup_path(db_path, &current);
        if db_path.exists() {
            std::fs::copy(db_path, &backup)?;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "UPDATE schema_metadata SET value = ?1 WHERE key = 'version'",
            [migration.version],
        )?;
        tx.commit()?;

        let advanced = current_version(conn)?;
        if advanced != migration.version {
            return Err(StoreError::MigrationVerifyFailed {
                expected: migration.version.to_owned(),
                actual: advanced,
            });
        }
        tracing::info!(from = %current, to = migration.version, "applied migration");
        current = advanced;
    }

    Ok(current)
}

/// Restore the database from the backup taken immediately before the
/// migration to `version` was applied, and reopen the connection in place.
pub fn rollback(conn: &mut Connection, db_path: &Path, version: &str) -> Result<(), StoreError> {
    let backup = backup_path(db_path, version);
    if !backup.exists() {
        return Err(StoreError::BackupMissing {
            version: version.to_owned(),
            path: backup,
        });
    }
    // Close the current connection's hold on the file before overwriting it.
    std::fs::copy(&backup, db_path)?;
    *conn = Connection::open(db_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gt_handles_semver_width() {
        assert!(version_gt("1.0.0", "0.9.0"));
        assert!(version_gt("1.1.0", "1.0.0"));
        assert!(!version_gt("1.0.0", "1.0.0"));
        assert!(!version_gt("0.2.0", "1.0.0"));
    }

    #[test]
    fn migrate_to_latest_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let mut conn = Connection::open(&db_path).unwrap();

        let v1 = migrate_to_latest(&mut conn, &db_path).unwrap();
        assert_eq!(v1, MIGRATIONS.last().unwrap().version);

        let backups_after_first: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".backup"))
            .collect();

        let v2 = migrate_to_latest(&mut conn, &db_path).unwrap();
        assert_eq!(v1, v2);

        let backups_after_second: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".backup"))
            .collect();
        assert_eq!(backups_after_first.len(), backups_after_second.len());
    }

    #[test]
    fn migrate_to_latest_creates_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let mut conn = Connection::open(&db_path).unwrap();
        migrate_to_latest(&mut conn, &db_path).unwrap();

        for table in [
            "sessions",
            "file_claims",
            "conflict_resolutions",
            "auto_fix_suggestions",
            "merge_subscriptions",
            "merge_events",
            "budget_tracking",
            "schema_metadata",
        ] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }

    #[test]
    fn rollback_without_backup_errors() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let mut conn = Connection::open(&db_path).unwrap();
        migrate_to_latest(&mut conn, &db_path).unwrap();

        let err = rollback(&mut conn, &db_path, "9.9.9").unwrap_err();
        assert!(matches!(err, StoreError::BackupMissing { .. }));
    }

    #[test]
    fn rollback_restores_previous_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");
        let mut conn = Connection::open(&db_path).unwrap();
        migrate_to_latest(&mut conn, &db_path).unwrap();

        rollback(&mut conn, &db_path, "0.0.0").unwrap();
        let version = current_version(&conn).unwrap();
        assert_eq!(version, UNVERSIONED);
    }
}

//! File claim table access.
//!
//! This module stores and queries claim rows; the compatibility-matrix
//! decision logic lives in `agentdock-core::claims` (the Claim Manager,
//! C4), which is the only caller that needs to know what "incompatible"
//! means. This module only knows how to persist and filter rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{ClaimMode, FileClaim};
use crate::time;

fn row_to_claim(row: &Row<'_>) -> rusqlite::Result<FileClaim> {
    let claimed_at: String = row.get("claimed_at")?;
    let expires_at: String = row.get("expires_at")?;
    let mode: String = row.get("mode")?;
    let escalated_from: Option<String> = row.get("escalated_from")?;

    Ok(FileClaim {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        repo_path: row.get("repo_path")?,
        file_path: row.get("file_path")?,
        mode: ClaimMode::parse(&mode).unwrap_or(ClaimMode::Shared),
        claimed_at: time::from_storage_string(&claimed_at).unwrap_or_else(|_| time::now()),
        expires_at: time::from_storage_string(&expires_at).unwrap_or_else(|_| time::now()),
        active: row.get::<_, i64>("active")? != 0,
        escalated_from: escalated_from.and_then(|m| ClaimMode::parse(&m)),
        reason: row.get("reason")?,
    })
}

const SELECT_COLUMNS: &str =
    "id, session_id, repo_path, file_path, mode, claimed_at, expires_at, active, escalated_from, reason";

impl Store {
    /// Insert a new active claim row.
    pub fn insert_claim(&self, claim: &FileClaim) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "INSERT INTO file_claims (id, session_id, repo_path, file_path, mode, \
                 claimed_at, expires_at, active, escalated_from, reason) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    claim.id,
                    claim.session_id,
                    claim.repo_path,
                    claim.file_path,
                    claim.mode.as_db_str(),
                    time::to_storage_string(claim.claimed_at),
                    time::to_storage_string(claim.expires_at),
                    i64::from(claim.active),
                    claim.escalated_from.map(ClaimMode::as_db_str),
                    claim.reason,
                ],
            )?;
            Ok(())
        })
    }

    /// Fetch a claim by id.
    pub fn get_claim(&self, id: &str) -> Result<Option<FileClaim>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM file_claims WHERE id = ?1");
            conn.query_row(&sql, params![id], row_to_claim)
                .optional()
                .map_err(StoreError::from)
        })
    }

    /// Active, unexpired claims on `(repo_path, file_path)` as of `now`.
    pub fn active_claims_for_file(
        &self,
        repo_path: &str,
        file_path: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<FileClaim>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM file_claims \
                 WHERE repo_path = ?1 AND file_path = ?2 AND active = 1 AND expires_at > ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![repo_path, file_path, time::to_storage_string(now)],
                    row_to_claim,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// List claims, optionally filtered by session, repo, file, mode, and
    /// active flag (spec.md §4.2 `List`).
    #[allow(clippy::too_many_arguments)]
    pub fn list_claims(
        &self,
        session_id: Option<&str>,
        repo_path: Option<&str>,
        file_path: Option<&str>,
        mode: Option<ClaimMode>,
        active: Option<bool>,
    ) -> Result<Vec<FileClaim>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM file_claims");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_claim)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .filter(|c| session_id.is_none_or(|s| c.session_id == s))
                .filter(|c| repo_path.is_none_or(|r| c.repo_path == r))
                .filter(|c| file_path.is_none_or(|f| c.file_path == f))
                .filter(|c| mode.is_none_or(|m| c.mode == m))
                .filter(|c| active.is_none_or(|a| c.active == a))
                .collect())
        })
    }

    /// Mark a claim inactive, preserving the row for history.
    pub fn deactivate_claim(&self, id: &str) -> Result<bool, StoreError> {
        self.with_txn(|tx| {
            let affected = tx.execute(
                "UPDATE file_claims SET active = 0 WHERE id = ?1 AND active = 1",
                params![id],
            )?;
            Ok(affected > 0)
        })
    }

    /// Update a claim's mode in place, recording the prior mode as
    /// `escalated_from` (spec.md §4.2 `Escalate`).
    pub fn escalate_claim(&self, id: &str, new_mode: ClaimMode, from_mode: ClaimMode) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "UPDATE file_claims SET mode = ?1, escalated_from = ?2 WHERE id = ?3",
                params![new_mode.as_db_str(), from_mode.as_db_str(), id],
            )?;
            Ok(())
        })
    }

    /// Deactivate every active claim owned by `session_id` (called on
    /// session release/death).
    pub fn deactivate_claims_for_session(&self, session_id: &str) -> Result<usize, StoreError> {
        self.with_txn(|tx| {
            let affected = tx.execute(
                "UPDATE file_claims SET active = 0 WHERE session_id = ?1 AND active = 1",
                params![session_id],
            )?;
            Ok(affected)
        })
    }

    /// Deactivate every active claim whose `expires_at` has passed.
    pub fn deactivate_expired_claims(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_txn(|tx| {
            let affected = tx.execute(
                "UPDATE file_claims SET active = 0 WHERE active = 1 AND expires_at <= ?1",
                params![time::to_storage_string(now)],
            )?;
            Ok(affected)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClaimMode;
    use chrono::Duration;

    fn sample(id: &str, session: &str, file: &str, mode: ClaimMode) -> FileClaim {
        let now = time::now();
        FileClaim {
            id: id.to_owned(),
            session_id: session.to_owned(),
            repo_path: "/repo".to_owned(),
            file_path: file.to_owned(),
            mode,
            claimed_at: now,
            expires_at: now + Duration::hours(24),
            active: true,
            escalated_from: None,
            reason: None,
        }
    }

    #[test]
    fn active_claims_for_file_excludes_expired() {
        let store = Store::open_in_memory().unwrap();
        let mut claim = sample("c1", "s1", "a.rs", ClaimMode::Exclusive);
        claim.expires_at = time::now() - Duration::hours(1);
        store.insert_claim(&claim).unwrap();

        let active = store
            .active_claims_for_file("/repo", "a.rs", time::now())
            .unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn active_claims_for_file_includes_unexpired() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_claim(&sample("c1", "s1", "a.rs", ClaimMode::Exclusive))
            .unwrap();
        let active = store
            .active_claims_for_file("/repo", "a.rs", time::now())
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn deactivate_claim_is_idempotent_false_on_second_call() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_claim(&sample("c1", "s1", "a.rs", ClaimMode::Exclusive))
            .unwrap();
        assert!(store.deactivate_claim("c1").unwrap());
        assert!(!store.deactivate_claim("c1").unwrap());
    }

    #[test]
    fn deactivate_claims_for_session_only_affects_that_session() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_claim(&sample("c1", "s1", "a.rs", ClaimMode::Exclusive))
            .unwrap();
        store
            .insert_claim(&sample("c2", "s2", "b.rs", ClaimMode::Exclusive))
            .unwrap();
        let n = store.deactivate_claims_for_session("s1").unwrap();
        assert_eq!(n, 1);
        assert!(store.get_claim("c2").unwrap().unwrap().active);
    }

    #[test]
    fn list_claims_filters_by_mode_and_active() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_claim(&sample("c1", "s1", "a.rs", ClaimMode::Exclusive))
            .unwrap();
        store
            .insert_claim(&sample("c2", "s1", "b.rs", ClaimMode::Shared))
            .unwrap();
        store.deactivate_claim("c2").unwrap();

        let exclusive_only = store
            .list_claims(None, None, None, Some(ClaimMode::Exclusive), None)
            .unwrap();
        assert_eq!(exclusive_only.len(), 1);

        let active_only = store.list_claims(None, None, None, None, Some(true)).unwrap();
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].id, "c1");
    }

    #[test]
    fn escalate_claim_records_prior_mode() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_claim(&sample("c1", "s1", "a.rs", ClaimMode::Intent))
            .unwrap();
        store
            .escalate_claim("c1", ClaimMode::Exclusive, ClaimMode::Intent)
            .unwrap();
        let claim = store.get_claim("c1").unwrap().unwrap();
        assert_eq!(claim.mode, ClaimMode::Exclusive);
        assert_eq!(claim.escalated_from, Some(ClaimMode::Intent));
    }
}

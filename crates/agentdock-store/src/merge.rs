//! Merge subscription / event table access (C10 Merge Watcher persistence).

use rusqlite::{params, OptionalExtension, Row};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{MergeEvent, MergeSubscription};
use crate::time;

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<MergeSubscription> {
    Ok(MergeSubscription {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        repo_path: row.get("repo_path")?,
        branch_name: row.get("branch_name")?,
        target_branch: row.get("target_branch")?,
        satisfied: row.get::<_, i64>("satisfied")? != 0,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<MergeEvent> {
    let merged_at: String = row.get("merged_at")?;
    let detected_at: String = row.get("detected_at")?;
    Ok(MergeEvent {
        id: row.get("id")?,
        repo_path: row.get("repo_path")?,
        branch_name: row.get("branch_name")?,
        target_branch: row.get("target_branch")?,
        merged_at: time::from_storage_string(&merged_at).unwrap_or_else(|_| time::now()),
        detected_at: time::from_storage_string(&detected_at).unwrap_or_else(|_| time::now()),
        source_commit: row.get("source_commit")?,
        notification_sent: row.get::<_, i64>("notification_sent")? != 0,
    })
}

impl Store {
    /// Register a new merge subscription.
    pub fn insert_merge_subscription(&self, sub: &MergeSubscription) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "INSERT INTO merge_subscriptions \
                 (id, session_id, repo_path, branch_name, target_branch, satisfied) \
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    sub.id,
                    sub.session_id,
                    sub.repo_path,
                    sub.branch_name,
                    sub.target_branch,
                    i64::from(sub.satisfied),
                ],
            )?;
            Ok(())
        })
    }

    /// All subscriptions not yet satisfied.
    pub fn active_merge_subscriptions(&self) -> Result<Vec<MergeSubscription>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, repo_path, branch_name, target_branch, satisfied \
                 FROM merge_subscriptions WHERE satisfied = 0",
            )?;
            let rows = stmt
                .query_map([], row_to_subscription)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark a subscription satisfied once its merge has been detected.
    pub fn mark_subscription_satisfied(&self, id: &str) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "UPDATE merge_subscriptions SET satisfied = 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    /// Record a detected merge event with `notification_sent = false`.
    pub fn insert_merge_event(&self, event: &MergeEvent) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "INSERT INTO merge_events \
                 (id, repo_path, branch_name, target_branch, merged_at, detected_at, \
                  source_commit, notification_sent) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                params![
                    event.id,
                    event.repo_path,
                    event.branch_name,
                    event.target_branch,
                    time::to_storage_string(event.merged_at),
                    time::to_storage_string(event.detected_at),
                    event.source_commit,
                    i64::from(event.notification_sent),
                ],
            )?;
            Ok(())
        })
    }

    /// Mark a merge event as having had its notification sent.
    pub fn mark_event_notified(&self, id: &str) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "UPDATE merge_events SET notification_sent = 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    /// Fetch a merge event by id (used after insertion to confirm state).
    pub fn get_merge_event(&self, id: &str) -> Result<Option<MergeEvent>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, repo_path, branch_name, target_branch, merged_at, detected_at, \
                 source_commit, notification_sent FROM merge_events WHERE id = ?1",
                params![id],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }
}

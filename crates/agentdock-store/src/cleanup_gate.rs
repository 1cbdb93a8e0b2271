//! Stored timestamp gate so concurrent processes don't race on periodic
//! sweeps (claim TTL expiry, stale-session reaping) — spec.md §4.2/§5.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::Store;
use crate::error::StoreError;
use crate::time;

impl Store {
    /// Return `true` and update the gate if at least `min_interval` has
    /// elapsed since the last run of `gate_name` (or it has never run).
    /// Returns `false` without updating if the gate is still fresh, so at
    /// most one sweep per interval runs across concurrent processes.
    pub fn try_acquire_cleanup_gate(
        &self,
        gate_name: &str,
        min_interval: Duration,
    ) -> Result<bool, StoreError> {
        self.with_txn(|tx| {
            let last_run: Option<String> = tx
                .query_row(
                    "SELECT last_run_at FROM cleanup_gates WHERE name = ?1",
                    params![gate_name],
                    |row| row.get(0),
                )
                .optional()?;

            let now = time::now();
            let stale = match last_run {
                None => true,
                Some(raw) => {
                    let last: DateTime<Utc> = time::from_storage_string(&raw).unwrap_or(now);
                    now - last >= min_interval
                }
            };

            if !stale {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO cleanup_gates (name, last_run_at) VALUES (?1, ?2) \
                 ON CONFLICT(name) DO UPDATE SET last_run_at = excluded.last_run_at",
                params![gate_name, time::to_storage_string(now)],
            )?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquire_succeeds() {
        let store = Store::open_in_memory().unwrap();
        assert!(store
            .try_acquire_cleanup_gate("claim_cleanup", Duration::seconds(30))
            .unwrap());
    }

    #[test]
    fn second_acquire_within_interval_fails() {
        let store = Store::open_in_memory().unwrap();
        assert!(store
            .try_acquire_cleanup_gate("claim_cleanup", Duration::seconds(30))
            .unwrap());
        assert!(!store
            .try_acquire_cleanup_gate("claim_cleanup", Duration::seconds(30))
            .unwrap());
    }

    #[test]
    fn acquire_after_zero_interval_always_succeeds() {
        let store = Store::open_in_memory().unwrap();
        assert!(store
            .try_acquire_cleanup_gate("claim_cleanup", Duration::zero())
            .unwrap());
        assert!(store
            .try_acquire_cleanup_gate("claim_cleanup", Duration::zero())
            .unwrap());
    }
}

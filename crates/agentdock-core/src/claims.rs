//! Claim Manager (C4): three-mode file locking with the §4.2 compatibility
//! matrix, TTL expiration, escalation, and cleanup.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use agentdock_store::models::{ClaimMode, FileClaim};
use agentdock_store::{time, Store};

use crate::error::{ClaimConflictEntry, CoreError};

/// Default claim time-to-live when none is supplied.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Minimum interval between cleanup sweeps across concurrent processes.
pub const CLEANUP_GATE_NAME: &str = "claim_cleanup";

/// Result of a [`ClaimManager::check`] dry run.
#[derive(Debug)]
pub struct CheckResult {
    pub available: bool,
    pub conflicts: Vec<ClaimConflictEntry>,
}

/// Acquires/releases/escalates file claims under the compatibility matrix.
pub struct ClaimManager {
    store: Arc<Store>,
}

impl ClaimManager {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Acquire `mode` on `file_path` within `repo_path` for `session_id`.
    ///
    /// Requests from the same session as an existing claim always succeed
    /// (a session may stack claims, and re-requesting the same file is
    /// idempotent) — checked by filtering `other_sessions_only` before the
    /// compatibility scan.
    pub fn acquire(
        &self,
        session_id: &str,
        repo_path: &str,
        file_path: &str,
        mode: ClaimMode,
        ttl_hours: Option<i64>,
        reason: Option<String>,
    ) -> Result<FileClaim, CoreError> {
        crate::validate::validate_relative_path(file_path)?;
        if self.store.get_session(session_id)?.is_none() {
            return Err(CoreError::Validation(format!("session '{session_id}' does not exist")));
        }

        // The store serializes individual calls on its connection mutex but
        // exposes no combined check-and-insert transaction, so this acquire
        // has a narrow TOCTOU window under concurrent callers targeting the
        // same file; acceptable for this coordinator's conflict model since
        // a lost race surfaces as a conflict on the next `check`/sweep.
        let now = time::now();
        let active = self.store.active_claims_for_file(repo_path, file_path, now)?;
        let conflicts: Vec<_> = active
            .iter()
            .filter(|c| c.session_id != session_id)
            .filter(|c| !c.mode.compatible_with(mode))
            .collect();

        if !conflicts.is_empty() {
            return Err(CoreError::ClaimConflict {
                repo_path: repo_path.to_owned(),
                file_path: file_path.to_owned(),
                conflicts: conflicts.into_iter().map(ClaimConflictEntry::from).collect(),
            });
        }

        // Idempotent re-request: same session, same file, same mode already active.
        if let Some(existing) = active
            .into_iter()
            .find(|c| c.session_id == session_id && c.mode == mode)
        {
            return Ok(existing);
        }

        let ttl = Duration::hours(ttl_hours.unwrap_or(DEFAULT_TTL_HOURS));
        let claim = FileClaim {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            repo_path: repo_path.to_owned(),
            file_path: file_path.to_owned(),
            mode,
            claimed_at: now,
            expires_at: now + ttl,
            active: true,
            escalated_from: None,
            reason,
        };
        self.store.insert_claim(&claim)?;
        Ok(claim)
    }

    /// Release a claim. Returns `true` if it was released, `false` if it
    /// was already inactive or owned by someone else without `force`.
    pub fn release(&self, claim_id: &str, caller_session_id: &str, force: bool) -> Result<bool, CoreError> {
        let Some(claim) = self.store.get_claim(claim_id)? else {
            return Ok(false);
        };
        if !claim.active {
            return Ok(false);
        }
        if claim.session_id != caller_session_id && !force {
            return Ok(false);
        }
        Ok(self.store.deactivate_claim(claim_id)?)
    }

    /// Escalate a claim to a stronger mode. Legal transitions:
    /// `INTENT -> SHARED`, `INTENT -> EXCLUSIVE`, `SHARED -> EXCLUSIVE`.
    pub fn escalate(&self, claim_id: &str, to_mode: ClaimMode) -> Result<FileClaim, CoreError> {
        let claim = self
            .store
            .get_claim(claim_id)?
            .ok_or_else(|| CoreError::Validation(format!("claim '{claim_id}' not found")))?;

        if !is_legal_escalation(claim.mode, to_mode) {
            return Err(CoreError::InvalidEscalation {
                from: claim.mode,
                to: to_mode,
            });
        }

        let now = time::now();
        let active = self
            .store
            .active_claims_for_file(&claim.repo_path, &claim.file_path, now)?;
        let conflicts: Vec<_> = active
            .iter()
            .filter(|c| c.session_id != claim.session_id)
            .filter(|c| !c.mode.compatible_with(to_mode))
            .collect();
        if !conflicts.is_empty() {
            return Err(CoreError::ClaimConflict {
                repo_path: claim.repo_path.clone(),
                file_path: claim.file_path.clone(),
                conflicts: conflicts.into_iter().map(ClaimConflictEntry::from).collect(),
            });
        }

        self.store.escalate_claim(claim_id, to_mode, claim.mode)?;
        self.store
            .get_claim(claim_id)?
            .ok_or_else(|| CoreError::Validation("claim vanished during escalation".to_owned()))
    }

    /// Pure predicate used by dry-run planning: would `mode` be grantable
    /// on every path in `file_paths`, excluding `excluded_session_id`'s own
    /// claims from the conflict scan?
    pub fn check(
        &self,
        repo_path: &str,
        file_paths: &[String],
        mode: ClaimMode,
        excluded_session_id: &str,
    ) -> Result<CheckResult, CoreError> {
        let now = time::now();
        let mut conflicts = Vec::new();
        for file_path in file_paths {
            let active = self.store.active_claims_for_file(repo_path, file_path, now)?;
            conflicts.extend(
                active
                    .iter()
                    .filter(|c| c.session_id != excluded_session_id)
                    .filter(|c| !c.mode.compatible_with(mode))
                    .map(ClaimConflictEntry::from),
            );
        }
        Ok(CheckResult {
            available: conflicts.is_empty(),
            conflicts,
        })
    }

    /// List claims with optional filters (spec.md §4.2 `List`).
    #[allow(clippy::too_many_arguments)]
    pub fn list(
        &self,
        session_id: Option<&str>,
        repo_path: Option<&str>,
        file_path: Option<&str>,
        mode: Option<ClaimMode>,
        active: Option<bool>,
    ) -> Result<Vec<FileClaim>, CoreError> {
        Ok(self.store.list_claims(session_id, repo_path, file_path, mode, active)?)
    }

    /// Sweep expired claims and claims owned by dead sessions, gated so at
    /// most one sweep per `min_interval` runs across concurrent processes.
    /// `is_alive` decides whether a session's owning process is still live.
    pub fn cleanup(
        &self,
        min_interval: Duration,
        is_alive: impl Fn(&str) -> bool,
    ) -> Result<usize, CoreError> {
        if !self.store.try_acquire_cleanup_gate(CLEANUP_GATE_NAME, min_interval)? {
            return Ok(0);
        }

        let mut total = self.store.deactivate_expired_claims(time::now())?;

        let active_claims = self.store.list_claims(None, None, None, None, Some(true))?;
        let mut dead_sessions = std::collections::HashSet::new();
        for claim in &active_claims {
            if !dead_sessions.contains(&claim.session_id) && !is_alive(&claim.session_id) {
                dead_sessions.insert(claim.session_id.clone());
            }
        }
        for session_id in dead_sessions {
            total += self.store.deactivate_claims_for_session(&session_id)?;
        }

        Ok(total)
    }
}

const fn is_legal_escalation(from: ClaimMode, to: ClaimMode) -> bool {
    matches!(
        (from, to),
        (ClaimMode::Intent, ClaimMode::Shared)
            | (ClaimMode::Intent, ClaimMode::Exclusive)
            | (ClaimMode::Shared, ClaimMode::Exclusive)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdock_store::models::{ExecutionMode, Session};

    fn store_with_session(session_id: &str) -> Arc<Store> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let now = time::now();
        store
            .insert_session(&Session {
                id: session_id.to_owned(),
                pid: 1234,
                repo_path: "/repo".to_owned(),
                worktree_path: "/repo".to_owned(),
                worktree_name: None,
                is_main_repo: true,
                created_at: now,
                last_heartbeat_at: now,
                execution_mode: ExecutionMode::Local,
                sandbox_id: None,
                prompt: None,
                status: None,
                output_log: None,
                budget_limit: None,
                estimated_cost: None,
                actual_cost: None,
                template_name: None,
                git_user: None,
                git_email: None,
                ssh_key_provided: false,
            })
            .unwrap();
        store
    }

    #[test]
    fn acquire_exclusive_then_conflicting_shared_fails() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(Arc::clone(&store));
        // need a second session for conflict
        let now = time::now();
        store
            .insert_session(&Session {
                id: "b".to_owned(),
                pid: 5678,
                repo_path: "/repo".to_owned(),
                worktree_path: "/repo".to_owned(),
                worktree_name: None,
                is_main_repo: false,
                created_at: now,
                last_heartbeat_at: now,
                execution_mode: ExecutionMode::Local,
                sandbox_id: None,
                prompt: None,
                status: None,
                output_log: None,
                budget_limit: None,
                estimated_cost: None,
                actual_cost: None,
                template_name: None,
                git_user: None,
                git_email: None,
                ssh_key_provided: false,
            })
            .unwrap();

        mgr.acquire("a", "/repo", "src/a.ts", ClaimMode::Exclusive, None, None)
            .unwrap();
        let err = mgr
            .acquire("b", "/repo", "src/a.ts", ClaimMode::Shared, None, None)
            .unwrap_err();
        match err {
            CoreError::ClaimConflict { conflicts, .. } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].session_id, "a");
            }
            other => panic!("expected ClaimConflict, got {other:?}"),
        }
    }

    #[test]
    fn same_session_reacquire_is_idempotent() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        let c1 = mgr
            .acquire("a", "/repo", "src/a.ts", ClaimMode::Exclusive, None, None)
            .unwrap();
        let c2 = mgr
            .acquire("a", "/repo", "src/a.ts", ClaimMode::Exclusive, None, None)
            .unwrap();
        assert_eq!(c1.id, c2.id);
    }

    #[test]
    fn acquire_release_is_noop_on_active_claims() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        let claim = mgr
            .acquire("a", "/repo", "src/a.ts", ClaimMode::Shared, None, None)
            .unwrap();
        assert!(mgr.release(&claim.id, "a", false).unwrap());
        let active = mgr.list(None, None, None, None, Some(true)).unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn release_by_other_session_without_force_fails() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        let claim = mgr
            .acquire("a", "/repo", "src/a.ts", ClaimMode::Shared, None, None)
            .unwrap();
        assert!(!mgr.release(&claim.id, "b", false).unwrap());
        assert!(mgr.release(&claim.id, "b", true).unwrap());
    }

    #[test]
    fn escalate_intent_to_exclusive_without_contention_succeeds() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        let claim = mgr
            .acquire("a", "/repo", "f", ClaimMode::Intent, None, None)
            .unwrap();
        let escalated = mgr.escalate(&claim.id, ClaimMode::Exclusive).unwrap();
        assert_eq!(escalated.mode, ClaimMode::Exclusive);
        assert_eq!(escalated.escalated_from, Some(ClaimMode::Intent));
    }

    #[test]
    fn escalate_blocked_by_other_sessions_shared_claim() {
        let store = store_with_session("a");
        let now = time::now();
        store
            .insert_session(&Session {
                id: "b".to_owned(),
                pid: 42,
                repo_path: "/repo".to_owned(),
                worktree_path: "/repo".to_owned(),
                worktree_name: None,
                is_main_repo: false,
                created_at: now,
                last_heartbeat_at: now,
                execution_mode: ExecutionMode::Local,
                sandbox_id: None,
                prompt: None,
                status: None,
                output_log: None,
                budget_limit: None,
                estimated_cost: None,
                actual_cost: None,
                template_name: None,
                git_user: None,
                git_email: None,
                ssh_key_provided: false,
            })
            .unwrap();
        let mgr = ClaimManager::new(Arc::clone(&store));
        let claim = mgr
            .acquire("a", "/repo", "f", ClaimMode::Intent, None, None)
            .unwrap();
        mgr.acquire("b", "/repo", "f", ClaimMode::Shared, None, None)
            .unwrap();
        let err = mgr.escalate(&claim.id, ClaimMode::Exclusive).unwrap_err();
        assert!(matches!(err, CoreError::ClaimConflict { .. }));
    }

    #[test]
    fn escalate_illegal_transition_errors() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        let claim = mgr
            .acquire("a", "/repo", "f", ClaimMode::Exclusive, None, None)
            .unwrap();
        let err = mgr.escalate(&claim.id, ClaimMode::Intent).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEscalation { .. }));
    }

    #[test]
    fn cleanup_is_gated_to_one_sweep_per_interval() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        assert!(mgr.cleanup(Duration::seconds(60), |_| true).is_ok());
        // Second call within the interval should be a no-op (0 deactivated,
        // regardless of expired state) because the gate blocks the sweep.
        let n = mgr.cleanup(Duration::seconds(60), |_| true).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn cleanup_deactivates_claims_of_dead_sessions() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        mgr.acquire("a", "/repo", "f", ClaimMode::Shared, None, None)
            .unwrap();
        let n = mgr.cleanup(Duration::zero(), |_| false).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn path_validation_rejects_traversal() {
        let store = store_with_session("a");
        let mgr = ClaimManager::new(store);
        let err = mgr
            .acquire("a", "/repo", "../escape", ClaimMode::Shared, None, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}

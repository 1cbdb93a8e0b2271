//! Session Coordinator (C3): registration, heartbeat, release, and the
//! stale-session/orphaned-worktree reaper.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use agentdock_git::WorktreeAdapter;
use agentdock_store::models::{ExecutionMode, Session};
use agentdock_store::{time, Store};

use crate::error::CoreError;

/// Default staleness window: a session whose heartbeat is older than this
/// and whose PID is no longer alive is reaped.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 120;

pub const SESSION_CLEANUP_GATE_NAME: &str = "session_cleanup";

/// Outcome of a [`Coordinator::cleanup`] sweep.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub sessions_reaped: usize,
    pub worktrees_removed: usize,
    pub orphaned_worktrees_removed: usize,
    pub worktree_errors: Vec<String>,
}

/// A freshly registered session plus the live-session count it was decided
/// against, per spec.md §4.3's `parallelSessions` field.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Registration {
    #[serde(flatten)]
    pub session: Session,
    pub parallel_sessions: usize,
}

/// Registers and tracks agent sessions bound to a repo and a worktree.
pub struct Coordinator<A: WorktreeAdapter> {
    store: Arc<Store>,
    worktree: A,
}

impl<A: WorktreeAdapter> Coordinator<A> {
    pub fn new(store: Arc<Store>, worktree: A) -> Self {
        Self { store, worktree }
    }

    /// Register a new session. Counts *live* sessions against `repo_path`
    /// (OS process exists and its heartbeat is within `DEFAULT_STALE_AFTER_SECS`)
    /// via `is_alive`; if that count is zero, the new session runs directly in
    /// the main repo, otherwise it gets a fresh worktree of its own. Returns
    /// the live count including the new session itself, for
    /// spec.md §4.3's `parallelSessions`.
    pub fn register(
        &self,
        pid: i64,
        repo_path: &str,
        execution_mode: ExecutionMode,
        prompt: Option<String>,
        template_name: Option<String>,
        worktree_prefix: &str,
        is_alive: impl Fn(i64) -> bool,
    ) -> Result<Registration, CoreError> {
        let now = time::now();
        let stale_after = Duration::seconds(DEFAULT_STALE_AFTER_SECS);
        let existing = self.store.list_sessions_for_repo(repo_path)?;
        let live_count = existing
            .iter()
            .filter(|session| now - session.last_heartbeat_at < stale_after && is_alive(session.pid))
            .count();
        let needs_worktree = live_count > 0;

        let (worktree_path, worktree_name, is_main_repo) = if needs_worktree {
            let name = self.worktree.generate_worktree_name(worktree_prefix);
            let outcome = self.worktree.create_worktree(&name, "HEAD")?;
            if !outcome.success {
                return Err(CoreError::Validation(format!(
                    "worktree creation failed: {}",
                    outcome.error.unwrap_or_default()
                )));
            }
            let path = agentdock_git::adapter::worktree_container_path(
                std::path::Path::new(repo_path),
                agentdock_git::git_cli::WORKTREE_CONTAINER,
                &name,
            );
            (path.to_string_lossy().into_owned(), Some(name), false)
        } else {
            (repo_path.to_owned(), None, true)
        };

        let session = Session {
            id: Uuid::new_v4().to_string(),
            pid,
            repo_path: repo_path.to_owned(),
            worktree_path,
            worktree_name,
            is_main_repo,
            created_at: now,
            last_heartbeat_at: now,
            execution_mode,
            sandbox_id: None,
            prompt,
            status: None,
            output_log: None,
            budget_limit: None,
            estimated_cost: None,
            actual_cost: None,
            template_name,
            git_user: None,
            git_email: None,
            ssh_key_provided: false,
        };
        self.store.insert_session(&session)?;
        Ok(Registration {
            session,
            parallel_sessions: live_count + 1,
        })
    }

    /// Update a session's heartbeat timestamp. Returns `false` if `pid` has
    /// no registered session.
    pub fn heartbeat(&self, pid: i64) -> Result<bool, CoreError> {
        Ok(self.store.touch_heartbeat(pid)?)
    }

    /// Release a session: deactivate its claims, optionally remove its
    /// worktree, and delete the session row.
    pub fn release(&self, session_id: &str, remove_worktree: bool) -> Result<(), CoreError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_owned()))?;

        self.store.deactivate_claims_for_session(session_id)?;

        if remove_worktree {
            if let Some(name) = &session.worktree_name {
                self.worktree.remove_worktree(name, false)?;
            }
        }

        self.store.delete_session(session_id)?;
        Ok(())
    }

    /// Reap sessions whose process is no longer alive and whose heartbeat
    /// predates `stale_after`, releasing their claims and worktrees, then
    /// sweep worktrees matching `worktree_prefix` that have no live session
    /// pointing at them (orphaned by a crash or a row deleted out of band).
    /// Gated so at most one sweep per `min_interval` runs across processes.
    pub fn cleanup(
        &self,
        stale_after: Duration,
        min_interval: Duration,
        worktree_prefix: &str,
        is_alive: impl Fn(i64) -> bool,
    ) -> Result<CleanupReport, CoreError> {
        let mut report = CleanupReport::default();
        if !self
            .store
            .try_acquire_cleanup_gate(SESSION_CLEANUP_GATE_NAME, min_interval)?
        {
            return Ok(report);
        }

        let now = time::now();
        for session in self.store.list_all_sessions()? {
            let stale = now - session.last_heartbeat_at >= stale_after;
            if !stale || is_alive(session.pid) {
                continue;
            }

            self.store.deactivate_claims_for_session(&session.id)?;

            if let Some(name) = &session.worktree_name {
                match self.worktree.remove_worktree(name, false) {
                    Ok(outcome) if outcome.success => report.worktrees_removed += 1,
                    Ok(outcome) => report
                        .worktree_errors
                        .push(outcome.error.unwrap_or_else(|| "unknown worktree error".to_owned())),
                    Err(err) => report.worktree_errors.push(err.to_string()),
                }
            }

            self.store.delete_session(&session.id)?;
            report.sessions_reaped += 1;
        }

        let live_worktree_names: std::collections::HashSet<String> = self
            .store
            .list_all_sessions()?
            .into_iter()
            .filter_map(|session| session.worktree_name)
            .collect();

        for worktree in self.worktree.list_worktrees()? {
            if worktree.is_main {
                continue;
            }
            let Some(name) = worktree.path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(worktree_prefix) || live_worktree_names.contains(name) {
                continue;
            }

            match self.worktree.remove_worktree(name, false) {
                Ok(outcome) if outcome.success => report.orphaned_worktrees_removed += 1,
                Ok(outcome) => report
                    .worktree_errors
                    .push(outcome.error.unwrap_or_else(|| "unknown worktree error".to_owned())),
                Err(err) => report.worktree_errors.push(err.to_string()),
            }
        }

        Ok(report)
    }

    /// List sessions registered against `repo_path`.
    pub fn list(&self, repo_path: &str) -> Result<Vec<Session>, CoreError> {
        Ok(self.store.list_sessions_for_repo(repo_path)?)
    }
}

/// Zero-signal liveness probe: `kill(pid, 0)` succeeds iff the process
/// exists and is visible to this user, without actually signaling it.
///
/// Cross-host sessions (a PID recorded by one machine, checked from
/// another) cannot be probed this way; callers outside the owning host
/// should treat such sessions as alive until their heartbeat alone goes
/// stale, since a false "dead" reap is destructive and a stale heartbeat
/// already bounds the damage.
#[must_use]
pub fn is_pid_alive(pid: i64) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

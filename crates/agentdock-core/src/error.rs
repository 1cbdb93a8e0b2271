//! Error types for the coordinator and claim manager.

use serde::Serialize;
use thiserror::Error;

use agentdock_store::models::{ClaimMode, FileClaim};

/// One conflicting claim reported by a failed `acquire` or `escalate`.
#[derive(Clone, Debug, Serialize)]
pub struct ClaimConflictEntry {
    pub session_id: String,
    pub mode: ClaimMode,
    pub reason: Option<String>,
}

impl From<&FileClaim> for ClaimConflictEntry {
    fn from(claim: &FileClaim) -> Self {
        Self {
            session_id: claim.session_id.clone(),
            mode: claim.mode,
            reason: claim.reason.clone(),
        }
    }
}

/// Errors from coordinator and claim-manager operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation (bad path, unknown mode, empty name, …).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested session does not exist.
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// `acquire` or `escalate` found an incompatible active claim.
    #[error("claim conflict on {repo_path}:{file_path}: {} conflicting claim(s)", conflicts.len())]
    ClaimConflict {
        repo_path: String,
        file_path: String,
        conflicts: Vec<ClaimConflictEntry>,
    },

    /// `escalate` was asked to perform a transition not in §4.2's legal set.
    #[error("invalid escalation: {from:?} -> {to:?}")]
    InvalidEscalation { from: ClaimMode, to: ClaimMode },

    /// Underlying worktree adapter failure.
    #[error("worktree error: {0}")]
    Worktree(#[from] agentdock_git::GitError),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] agentdock_store::StoreError),
}

//! Value types returned by [`WorktreeAdapter`](crate::WorktreeAdapter) methods.

use std::path::PathBuf;

/// One entry in the list returned by `WorktreeAdapter::list_worktrees`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeInfo {
    /// Absolute path to the worktree's working directory.
    pub path: PathBuf,
    /// The branch checked out in this worktree, if any (detached HEAD → `None`).
    pub branch: Option<String>,
    /// `true` for the repository's main (first) worktree.
    pub is_main: bool,
}

/// Outcome of a worktree create/remove operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeOutcome {
    /// `true` if the operation succeeded.
    pub success: bool,
    /// Captured stdout from the underlying command, for diagnostics.
    pub output: String,
    /// Present when `success` is `false`.
    pub error: Option<String>,
}

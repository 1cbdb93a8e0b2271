//! The [`WorktreeAdapter`] trait — the abstraction boundary between the
//! coordinator and the underlying worktree-creation tool.

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::types::{WorktreeInfo, WorktreeOutcome};

/// Capability set for creating, removing, and listing isolated working
/// trees. Implementations may wrap a dedicated tool (e.g. `gtr`) or shell
/// out to the underlying VCS directly; callers depend only on this trait.
pub trait WorktreeAdapter {
    /// Create a new worktree named `name`, checked out from `from_ref`
    /// (defaults to `"HEAD"` at the call site).
    fn create_worktree(&self, name: &str, from_ref: &str) -> Result<WorktreeOutcome, GitError>;

    /// Remove the worktree named `name`. When `delete_branch` is set, also
    /// deletes the branch the worktree was tracking.
    fn remove_worktree(&self, name: &str, delete_branch: bool) -> Result<WorktreeOutcome, GitError>;

    /// List all worktrees known to the repository, main worktree first.
    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, GitError>;

    /// Return the absolute path to the repository's main worktree, or
    /// `None` if the current directory is not inside a git repository.
    fn get_main_repo_path(&self) -> Option<PathBuf>;

    /// Generate a worktree name unique enough to avoid collisions with an
    /// existing worktree.
    fn generate_worktree_name(&self, prefix: &str) -> String {
        crate::naming::generate_worktree_name(prefix)
    }
}

/// Resolve the path a new worktree named `name` should live at, given the
/// repository root and a `.worktrees`-style container directory name.
#[must_use]
pub fn worktree_container_path(repo_root: &Path, container: &str, name: &str) -> PathBuf {
    repo_root.join(container).join(name)
}

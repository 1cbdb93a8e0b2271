//! Errors returned by [`WorktreeAdapter`](crate::WorktreeAdapter) implementations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from worktree lifecycle operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository root could not be determined (not inside a git repo,
    /// or `git rev-parse --show-toplevel` failed).
    #[error("not a git repository at or above {}", path.display())]
    NotARepo {
        /// The path that was probed.
        path: PathBuf,
    },

    /// A worktree with this name already exists on disk.
    #[error("worktree '{name}' already exists at {}", path.display())]
    WorktreeExists {
        /// The worktree name.
        name: String,
        /// The existing path.
        path: PathBuf,
    },

    /// The requested worktree does not exist.
    #[error("worktree '{name}' not found")]
    WorktreeNotFound {
        /// The worktree name that was not found.
        name: String,
    },

    /// The underlying `git` (or `gtr`) invocation failed.
    #[error("git command failed: `{command}`\n  stderr: {stderr}")]
    CommandFailed {
        /// The command line that was run, space-joined for display.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// The `git`/`gtr` binary could not be located or spawned.
    #[error("failed to spawn `{binary}`: {source}")]
    SpawnFailed {
        /// The binary name that failed to spawn.
        binary: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred while reading worktree administrative files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//! Errors for batch execution and merge watching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("a task future panicked: {0}")]
    Join(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("worktree error: {0}")]
    Worktree(#[from] agentdock_git::GitError),

    #[error("store error: {0}")]
    Store(#[from] agentdock_store::StoreError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] agentdock_sandbox::SandboxError),

    #[error("core error: {0}")]
    Core(#[from] agentdock_core::CoreError),
}

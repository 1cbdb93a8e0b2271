//! Root error type wrapping every sub-crate's error enum behind one type the
//! CLI harness can match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("store error: {0}")]
    Store(#[from] agentdock_store::StoreError),

    #[error("git error: {0}")]
    Git(#[from] agentdock_git::GitError),

    #[error("core error: {0}")]
    Core(#[from] agentdock_core::CoreError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] agentdock_sandbox::SandboxError),

    #[error("exec error: {0}")]
    Exec(#[from] agentdock_exec::ExecError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    /// Exit code per spec.md §6: 0 success, 1 recoverable failure, 2 invalid
    /// argument. This type never represents success, so it only ever
    /// chooses between 1 and 2.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

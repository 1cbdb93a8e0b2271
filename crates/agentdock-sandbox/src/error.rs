//! Error taxonomy for sandbox lifecycle, file sync, and execution (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// No provider API key found in the environment.
    #[error("sandbox provider API key is not set")]
    ApiKeyMissing,

    #[error("failed to create sandbox: {reason}")]
    SandboxCreationFailed { reason: String },

    #[error("sandbox '{sandbox_id}' is not healthy: {reason}")]
    SandboxNotHealthy { sandbox_id: String, reason: String },

    #[error("remote command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("download failed: {reason}")]
    DownloadFailed { reason: String },

    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("execution exceeded its timeout")]
    ExecutionTimeout,

    #[error("path '{0}' failed validation")]
    InvalidPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] agentdock_store::StoreError),
}

//! The provider capability set (spec.md §6, §9): a sandbox is anything that
//! can run commands, move files, and report whether it's still alive. This
//! trait is the seam every other module in this crate depends on instead of
//! a concrete provider SDK, mirroring how `agentdock-git::WorktreeAdapter`
//! decouples the coordinator from the underlying VCS tool.

use async_trait::async_trait;

use crate::error::SandboxError;

/// Result of running a command inside a sandbox.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A single running sandbox instance.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Provider-assigned identifier.
    fn id(&self) -> &str;

    /// Run `cmd` inside the sandbox, killing it if it outlives `timeout_ms`.
    async fn run(&self, cmd: &str, timeout_ms: u64) -> Result<CommandOutput, SandboxError>;

    /// Write `bytes` to `path` inside the sandbox.
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), SandboxError>;

    /// Read the contents of `path` inside the sandbox.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError>;

    /// Whether the sandbox process is still alive.
    async fn is_running(&self) -> Result<bool, SandboxError>;

    /// Forcibly kill the sandbox.
    async fn kill(&self) -> Result<(), SandboxError>;

    /// Set (or reset) the provider-side wall-clock timeout.
    async fn set_timeout(&self, ms: u64) -> Result<(), SandboxError>;
}

/// Factory for sandboxes, authenticated via an API key taken from the
/// environment (spec.md §6).
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Start a new sandbox from `image`.
    async fn create(&self, image: &str) -> Result<Box<dyn Sandbox>, SandboxError>;

    /// Reconnect to a previously created sandbox by id, for health checks
    /// after a process restart.
    async fn reconnect(&self, sandbox_id: &str) -> Result<Box<dyn Sandbox>, SandboxError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::{async_trait, CommandOutput, Sandbox, SandboxError, SandboxProvider};

    /// In-process fake used by unit tests: never touches a network.
    pub struct MockSandbox {
        id: String,
        alive: AtomicBool,
        files: Mutex<std::collections::HashMap<String, Vec<u8>>>,
        pub responses: Mutex<Vec<CommandOutput>>,
    }

    impl MockSandbox {
        #[must_use]
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                alive: AtomicBool::new(true),
                files: Mutex::new(std::collections::HashMap::new()),
                responses: Mutex::new(Vec::new()),
            }
        }

        #[must_use]
        pub fn with_response(self, output: CommandOutput) -> Self {
            self.responses.lock().unwrap().push(output);
            self
        }
    }

    #[async_trait]
    impl Sandbox for MockSandbox {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, _cmd: &str, _timeout_ms: u64) -> Result<CommandOutput, SandboxError> {
            let mut queued = self.responses.lock().unwrap();
            Ok(if queued.is_empty() {
                CommandOutput::default()
            } else {
                queued.remove(0)
            })
        }

        async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), SandboxError> {
            self.files.lock().unwrap().insert(path.to_owned(), bytes.to_vec());
            Ok(())
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| SandboxError::InvalidPath(path.to_owned()))
        }

        async fn is_running(&self) -> Result<bool, SandboxError> {
            Ok(self.alive.load(Ordering::SeqCst))
        }

        async fn kill(&self) -> Result<(), SandboxError> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn set_timeout(&self, _ms: u64) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    /// Factory producing fresh [`MockSandbox`]es, for manager/driver tests.
    #[derive(Default)]
    pub struct MockProvider;

    #[async_trait]
    impl SandboxProvider for MockProvider {
        async fn create(&self, _image: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
            Ok(Box::new(MockSandbox::new(uuid::Uuid::new_v4().to_string())))
        }

        async fn reconnect(&self, sandbox_id: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
            Ok(Box::new(MockSandbox::new(sandbox_id.to_owned())))
        }
    }
}

//! Execution Driver (C7): the per-run state machine orchestrating one
//! remote agent execution, phase by phase (spec.md §4.6).

use std::time::Duration;

use crate::error::SandboxError;
use crate::manager::SandboxManager;
use crate::provider::Sandbox;
use crate::streamer::OutputStreamer;
use crate::sync;

/// Where git-identity values came from, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitIdentitySource {
    Cli,
    Env,
    Auto,
    Default,
}

#[derive(Clone, Debug)]
pub struct GitIdentity {
    pub user: String,
    pub email: String,
    pub source: GitIdentitySource,
}

const DEFAULT_GIT_USER: &str = "agentdock";
const DEFAULT_GIT_EMAIL: &str = "agentdock@localhost";

/// Resolve git identity per spec.md §4.6 step 5's priority order.
#[must_use]
pub fn resolve_git_identity(
    cli_user: Option<&str>,
    cli_email: Option<&str>,
    env_user: Option<&str>,
    env_email: Option<&str>,
    local_user: Option<&str>,
    local_email: Option<&str>,
) -> GitIdentity {
    if let (Some(user), Some(email)) = (cli_user, cli_email) {
        return GitIdentity {
            user: user.to_owned(),
            email: email.to_owned(),
            source: GitIdentitySource::Cli,
        };
    }
    if let (Some(user), Some(email)) = (env_user, env_email) {
        return GitIdentity {
            user: user.to_owned(),
            email: email.to_owned(),
            source: GitIdentitySource::Env,
        };
    }
    if let (Some(user), Some(email)) = (local_user, local_email) {
        return GitIdentity {
            user: user.to_owned(),
            email: email.to_owned(),
            source: GitIdentitySource::Auto,
        };
    }
    GitIdentity {
        user: DEFAULT_GIT_USER.to_owned(),
        email: DEFAULT_GIT_EMAIL.to_owned(),
        source: GitIdentitySource::Default,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Oauth,
}

pub struct ExecutionOptions {
    pub working_dir: String,
    pub timeout_minutes: u64,
    pub auth_method: AuthMethod,
    pub api_key: Option<String>,
    pub oauth_credentials: Option<String>,
    pub git_identity: GitIdentity,
    pub local_repo_origin_url: Option<String>,
    pub remote_log_path: String,
    pub local_log_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Completed,
    Timeout,
    Failed,
}

#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
    pub state: ExecutionState,
    pub error: Option<String>,
    pub remote_log_path: String,
}

/// Strip control characters (except `\n`/`\t`) and cap at 100 KB.
#[must_use]
pub fn sanitize_prompt(prompt: &str) -> String {
    const MAX_BYTES: usize = 100 * 1024;
    let cleaned: String = prompt
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    if cleaned.len() > MAX_BYTES {
        cleaned.chars().take(MAX_BYTES).collect()
    } else {
        cleaned
    }
}

/// Drive one execution end to end against `sandbox`.
pub async fn run(
    manager: &SandboxManager,
    sandbox_id: &str,
    sandbox: &dyn Sandbox,
    prompt: &str,
    options: &ExecutionOptions,
) -> Result<ExecutionResult, SandboxError> {
    // Phase 1: health preflight.
    let health = manager.monitor_health(sandbox_id, false).await?;
    if !health.is_healthy {
        return Err(SandboxError::SandboxNotHealthy {
            sandbox_id: sandbox_id.to_owned(),
            reason: health.error.unwrap_or_else(|| "unknown".to_owned()),
        });
    }

    // Phase 2/3: agent assurance + best-effort self-update.
    ensure_agent_available(sandbox).await?;
    let _ = self_update(sandbox).await;

    // Phase 4: credential provisioning.
    provision_credentials(sandbox, options).await?;

    // Phase 6: workspace init (best-effort, logged not propagated).
    if let Err(err) = init_workspace(sandbox, options).await {
        tracing::warn!(error = %err, "workspace init failed, continuing");
    }

    // Phase 8: run.
    let sanitized = sanitize_prompt(prompt);
    let escaped_prompt = sync::shell_escape(&sanitized);
    let exports = export_clause(options);
    let command = format!(
        "cd {} && {exports}echo {escaped_prompt} | agent -p --dangerously-skip-permissions > {} 2>&1",
        sync::shell_escape(&options.working_dir),
        options.remote_log_path,
    );

    let mut streamer = OutputStreamer::new(options.local_log_path.clone());
    let timeout_ms = options.timeout_minutes * 60_000;
    let run_result = sandbox.run(&command, timeout_ms).await;
    streamer.poll_once(sandbox, &options.remote_log_path).await;
    streamer.stop();

    let output = run_result.as_ref().map(|o| o.stdout.clone()).unwrap_or_default();
    let (state, exit_code, error) = classify(&run_result);

    Ok(ExecutionResult {
        success: matches!(state, ExecutionState::Completed),
        exit_code,
        output,
        state,
        error,
        remote_log_path: options.remote_log_path.clone(),
    })
}

fn classify(
    run_result: &Result<crate::provider::CommandOutput, SandboxError>,
) -> (ExecutionState, i32, Option<String>) {
    match run_result {
        Ok(output) if output.exit_code == 0 => (ExecutionState::Completed, 0, None),
        Ok(output) if output.exit_code == 124 => {
            (ExecutionState::Timeout, 124, Some("execution timed out".to_owned()))
        }
        Ok(output) => (
            ExecutionState::Failed,
            output.exit_code,
            Some(output.stderr.clone()),
        ),
        Err(SandboxError::ExecutionTimeout) => (ExecutionState::Timeout, 124, Some("execution timed out".to_owned())),
        Err(err) => (ExecutionState::Failed, -1, Some(err.to_string())),
    }
}

async fn ensure_agent_available(sandbox: &dyn Sandbox) -> Result<(), SandboxError> {
    let check = sandbox.run("command -v agent", 10_000).await?;
    if check.exit_code == 0 {
        return Ok(());
    }
    let install = sandbox
        .run("curl -fsSL https://example.invalid/install-agent.sh | sh", 120_000)
        .await?;
    if install.exit_code != 0 {
        return Err(SandboxError::ExecutionFailed {
            reason: "agent binary is not available on this base image and could not be installed".to_owned(),
        });
    }
    Ok(())
}

/// Best-effort self-update: built-in subcommand, then prefixed install,
/// then a package-runner wrapper. Success is `agent --version` equality
/// pre/post, or an "already up to date" message both counting as success.
/// Failure here is never fatal.
async fn self_update(sandbox: &dyn Sandbox) -> Result<(), SandboxError> {
    let before = sandbox.run("agent --version", 10_000).await?.stdout;

    let built_in = sandbox.run("agent update --yes", 60_000).await;
    if built_in.is_ok_and(|o| o.exit_code == 0) {
        return Ok(());
    }

    let prefixed = sandbox.run("npx -y agent-cli update --yes", 60_000).await;
    if prefixed.is_ok_and(|o| o.exit_code == 0) {
        return Ok(());
    }

    let wrapper = sandbox.run("npm exec -- agent-cli update --yes", 60_000).await;
    if wrapper.is_ok_and(|o| o.exit_code == 0) {
        return Ok(());
    }

    let after = sandbox.run("agent --version", 10_000).await?.stdout;
    if after == before {
        return Ok(());
    }
    Err(SandboxError::ExecutionFailed {
        reason: "agent self-update failed on every strategy".to_owned(),
    })
}

async fn provision_credentials(sandbox: &dyn Sandbox, options: &ExecutionOptions) -> Result<(), SandboxError> {
    match options.auth_method {
        AuthMethod::Oauth => {
            let creds = options.oauth_credentials.as_deref().unwrap_or_default();
            sandbox
                .write_file("/tmp/agentdock-oauth.json", creds.as_bytes())
                .await?;
            Ok(())
        }
        AuthMethod::ApiKey => Ok(()),
    }
}

fn export_clause(options: &ExecutionOptions) -> String {
    if options.auth_method == AuthMethod::ApiKey {
        let key = options.api_key.as_deref().unwrap_or_default();
        format!("export AGENT_API_KEY={} && ", sync::shell_escape(key))
    } else {
        String::new()
    }
}

async fn init_workspace(sandbox: &dyn Sandbox, options: &ExecutionOptions) -> Result<(), SandboxError> {
    let wd = sync::shell_escape(&options.working_dir);
    sandbox.run(&format!("cd {wd} && git init"), 10_000).await?;
    sandbox
        .run(
            &format!(
                "cd {wd} && git config user.name \"{}\" && git config user.email \"{}\"",
                options.git_identity.user.replace('"', "\\\""),
                options.git_identity.email.replace('"', "\\\"")
            ),
            10_000,
        )
        .await?;
    sandbox
        .run(&format!("cd {wd} && git add -A && git commit -m sync --allow-empty"), 20_000)
        .await?;
    if let Some(origin) = &options.local_repo_origin_url {
        sandbox
            .run(&format!("cd {wd} && git remote add origin {}", sync::shell_escape(origin)), 10_000)
            .await?;
    }
    Ok(())
}

#[must_use]
pub fn duration_as_f64_seconds(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockSandbox;
    use crate::provider::CommandOutput;

    fn ok(exit_code: i32) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
        }
    }

    #[test]
    fn sanitize_prompt_strips_control_chars_keeps_newline() {
        let raw = "hello\x07world\nnext\tline";
        assert_eq!(sanitize_prompt(raw), "helloworld\nnext\tline");
    }

    #[test]
    fn sanitize_prompt_caps_at_100kb() {
        let raw = "a".repeat(200 * 1024);
        assert_eq!(sanitize_prompt(&raw).len(), 100 * 1024);
    }

    #[test]
    fn git_identity_prefers_cli_over_env_over_auto_over_default() {
        let id = resolve_git_identity(
            Some("cli-user"),
            Some("cli@example.com"),
            Some("env-user"),
            Some("env@example.com"),
            Some("auto-user"),
            Some("auto@example.com"),
        );
        assert_eq!(id.source, GitIdentitySource::Cli);

        let id = resolve_git_identity(None, None, Some("env-user"), Some("env@example.com"), None, None);
        assert_eq!(id.source, GitIdentitySource::Env);

        let id = resolve_git_identity(None, None, None, None, None, None);
        assert_eq!(id.source, GitIdentitySource::Default);
    }

    #[test]
    fn git_identity_falls_through_on_partial_pair() {
        let id = resolve_git_identity(Some("cli-user"), None, None, None, None, None);
        assert_eq!(id.source, GitIdentitySource::Default);
    }

    #[test]
    fn classify_maps_exit_codes() {
        assert_eq!(classify(&Ok(ok(0))).0, ExecutionState::Completed);
        assert_eq!(classify(&Ok(ok(124))).0, ExecutionState::Timeout);
        assert_eq!(classify(&Ok(ok(1))).0, ExecutionState::Failed);
    }

    #[tokio::test]
    async fn self_update_succeeds_on_built_in_subcommand() {
        let sandbox = MockSandbox::new("s1")
            .with_response(ok(0)) // version check, unused on success path
            .with_response(ok(0)); // update --yes succeeds
        self_update(&sandbox).await.unwrap();
    }

    #[tokio::test]
    async fn self_update_non_fatal_on_total_failure() {
        let sandbox = MockSandbox::new("s1")
            .with_response(CommandOutput {
                stdout: "1.0.0".to_owned(),
                ..ok(0)
            })
            .with_response(ok(1))
            .with_response(ok(1))
            .with_response(ok(1))
            .with_response(CommandOutput {
                stdout: "1.0.0".to_owned(),
                ..ok(0)
            });
        assert!(self_update(&sandbox).await.is_ok());
    }

    #[tokio::test]
    async fn ensure_agent_available_skips_install_when_present() {
        let sandbox = MockSandbox::new("s1").with_response(ok(0));
        ensure_agent_available(&sandbox).await.unwrap();
    }
}

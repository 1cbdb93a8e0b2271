//! Thin CLI harness for the `agentdock` coordinator library.
//!
//! This is deliberately minimal: it exists to exercise the library end to
//! end (register/heartbeat/release a session, acquire/check/escalate/release
//! a claim, run a small parallel batch), not to be the full product CLI —
//! shell-hook installers, an MCP tool server, and human-formatted logs are
//! explicitly out of scope (see SPEC_FULL.md's ambient-stack note).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use agentdock::config::{self, AgentdockConfig};
use agentdock_core::{ClaimManager, Coordinator};
use agentdock_exec::{BatchConfig, TaskSpec};
use agentdock_git::GitCliAdapter;
use agentdock_sandbox::manager::SandboxManager;
use agentdock_sandbox::provider::mock::MockProvider;
use agentdock_store::models::{ClaimMode, ExecutionMode};
use agentdock_store::Store;

#[derive(Parser)]
#[command(name = "agentdock")]
#[command(version, about = "Coordinate multiple concurrent coding agent sessions sharing one repository")]
struct Cli {
    /// Path to the sqlite store (default: `~/.agentdock/state.db`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the JSON config file (default: `~/.agentdock/config.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit a single JSON document instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new session for the current process against a repo.
    Register {
        #[arg(long)]
        repo_path: String,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        template_name: Option<String>,
        #[arg(long, default_value = "parallel-")]
        worktree_prefix: String,
        /// OS pid to associate with this session (defaults to this
        /// process's own pid). Set this to the pid of the long-lived agent
        /// process this CLI invocation is registering on behalf of.
        #[arg(long)]
        pid: Option<i64>,
    },
    /// Refresh this process's session heartbeat.
    Heartbeat,
    /// Release a session, optionally removing its worktree.
    Release {
        session_id: String,
        #[arg(long)]
        repo_path: String,
        #[arg(long)]
        remove_worktree: bool,
    },
    /// List sessions active against a repo.
    Sessions {
        #[arg(long)]
        repo_path: String,
    },
    /// File claim operations.
    #[command(subcommand)]
    Claim(ClaimCommands),
    /// Run a small batch of tasks against sandboxes, bounded by concurrency.
    Batch {
        #[arg(long)]
        repo_path: String,
        #[arg(long, default_value = "base")]
        image: String,
        #[arg(long, default_value_t = agentdock_exec::DEFAULT_MAX_CONCURRENT)]
        max_concurrent: usize,
        #[arg(long)]
        fail_fast: bool,
        #[arg(long)]
        output_dir: PathBuf,
        #[arg(long, value_delimiter = ',')]
        prompts: Vec<String>,
        #[arg(long, default_value_t = 30)]
        timeout_minutes: u64,
    },
}

#[derive(Subcommand)]
enum ClaimCommands {
    Acquire {
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        repo_path: String,
        #[arg(long)]
        file_path: String,
        #[arg(long)]
        mode: String,
        #[arg(long)]
        ttl_hours: Option<i64>,
        #[arg(long)]
        reason: Option<String>,
    },
    Release {
        #[arg(long)]
        claim_id: String,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        force: bool,
    },
    Escalate {
        #[arg(long)]
        claim_id: String,
        #[arg(long)]
        to_mode: String,
    },
    Check {
        #[arg(long)]
        repo_path: String,
        #[arg(long, value_delimiter = ',')]
        file_paths: Vec<String>,
        #[arg(long)]
        mode: String,
        #[arg(long)]
        excluded_session_id: String,
    },
}

#[derive(Serialize)]
struct JsonEnvelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    agentdock::telemetry::init();
    let cli = Cli::parse();
    let json_mode = cli.json;

    match run(cli) {
        Ok(value) => {
            if json_mode {
                println!(
                    "{}",
                    serde_json::to_string(&JsonEnvelope { success: true, data: Some(value), error: None })
                        .unwrap_or_else(|_| r#"{"success":true}"#.to_owned())
                );
            } else {
                println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            }
        }
        Err(err) => {
            if json_mode {
                println!(
                    "{}",
                    serde_json::to_string(&JsonEnvelope::<()> { success: false, data: None, error: Some(err.to_string()) })
                        .unwrap_or_else(|_| r#"{"success":false}"#.to_owned())
                );
            } else {
                eprintln!("error: {err}");
            }
            std::process::exit(err.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<serde_json::Value, agentdock::CoordinatorError> {
    let db_path = cli.db.unwrap_or_else(|| config::expand_home("~/.agentdock/state.db"));
    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let _config: AgentdockConfig = AgentdockConfig::load(&config_path)?;

    let store = Arc::new(Store::open(&db_path)?);

    match cli.command {
        Commands::Register { repo_path, prompt, template_name, worktree_prefix, pid } => {
            let adapter = GitCliAdapter::new(PathBuf::from(&repo_path));
            let coordinator = Coordinator::new(Arc::clone(&store), adapter);
            let pid = pid.unwrap_or_else(|| i64::from(std::process::id()));
            let registration = coordinator.register(
                pid,
                &repo_path,
                ExecutionMode::Local,
                prompt,
                template_name,
                &worktree_prefix,
                agentdock_core::is_pid_alive,
            )?;
            Ok(serde_json::to_value(registration).unwrap_or_default())
        }
        Commands::Heartbeat => {
            let adapter = GitCliAdapter::new(PathBuf::from("."));
            let coordinator = Coordinator::new(Arc::clone(&store), adapter);
            let pid = i64::from(std::process::id());
            let updated = coordinator.heartbeat(pid)?;
            Ok(serde_json::json!({ "updated": updated }))
        }
        Commands::Release { session_id, repo_path, remove_worktree } => {
            let adapter = GitCliAdapter::new(PathBuf::from(&repo_path));
            let coordinator = Coordinator::new(Arc::clone(&store), adapter);
            coordinator.release(&session_id, remove_worktree)?;
            Ok(serde_json::json!({ "released": session_id }))
        }
        Commands::Sessions { repo_path } => {
            let adapter = GitCliAdapter::new(PathBuf::from(&repo_path));
            let coordinator = Coordinator::new(Arc::clone(&store), adapter);
            let sessions = coordinator.list(&repo_path)?;
            Ok(serde_json::to_value(sessions).unwrap_or_default())
        }
        Commands::Claim(cmd) => run_claim(&store, cmd),
        Commands::Batch { repo_path, image, max_concurrent, fail_fast, output_dir, prompts, timeout_minutes } => {
            run_batch_command(store, repo_path, image, max_concurrent, fail_fast, output_dir, prompts, timeout_minutes)
        }
    }
}

fn run_claim(store: &Arc<Store>, cmd: ClaimCommands) -> Result<serde_json::Value, agentdock::CoordinatorError> {
    let manager = ClaimManager::new(Arc::clone(store));
    match cmd {
        ClaimCommands::Acquire { session_id, repo_path, file_path, mode, ttl_hours, reason } => {
            let mode = parse_mode(&mode)?;
            let claim = manager.acquire(&session_id, &repo_path, &file_path, mode, ttl_hours, reason)?;
            Ok(serde_json::to_value(claim).unwrap_or_default())
        }
        ClaimCommands::Release { claim_id, session_id, force } => {
            let released = manager.release(&claim_id, &session_id, force)?;
            Ok(serde_json::json!({ "released": released }))
        }
        ClaimCommands::Escalate { claim_id, to_mode } => {
            let to_mode = parse_mode(&to_mode)?;
            let claim = manager.escalate(&claim_id, to_mode)?;
            Ok(serde_json::to_value(claim).unwrap_or_default())
        }
        ClaimCommands::Check { repo_path, file_paths, mode, excluded_session_id } => {
            let mode = parse_mode(&mode)?;
            let result = manager.check(&repo_path, &file_paths, mode, &excluded_session_id)?;
            Ok(serde_json::json!({
                "available": result.available,
                "conflicts": result.conflicts,
            }))
        }
    }
}

fn parse_mode(raw: &str) -> Result<ClaimMode, agentdock::CoordinatorError> {
    ClaimMode::parse(&raw.to_uppercase())
        .ok_or_else(|| agentdock::CoordinatorError::Core(agentdock_core::CoreError::Validation(format!("invalid claim mode '{raw}'"))))
}

#[tokio::main(flavor = "current_thread")]
async fn run_batch_command(
    store: Arc<Store>,
    repo_path: String,
    image: String,
    max_concurrent: usize,
    fail_fast: bool,
    output_dir: PathBuf,
    prompts: Vec<String>,
    timeout_minutes: u64,
) -> Result<serde_json::Value, agentdock::CoordinatorError> {
    let adapter = GitCliAdapter::new(PathBuf::from(&repo_path));
    let coordinator = Coordinator::new(store, adapter);
    let manager = SandboxManager::new(Arc::new(MockProvider));

    let tasks = prompts
        .into_iter()
        .enumerate()
        .map(|(i, prompt)| TaskSpec { id: format!("task-{i}"), description: prompt.clone(), prompt })
        .collect();

    let config = BatchConfig {
        tasks,
        max_concurrent,
        fail_fast,
        output_dir,
        repo_path,
        image,
        api_key_present: true,
        budget_per_task: None,
        timeout_minutes,
    };

    let report = agentdock_exec::run_batch(&coordinator, &manager, config, |_update| {}).await?;
    Ok(serde_json::json!({
        "batchId": report.batch_id,
        "successCount": report.success_count,
        "failureCount": report.failure_count,
        "cancelledCount": report.cancelled_count,
        "totalCost": report.total_cost,
    }))
}

//! Parallel Executor (C9): bounded fan-out over independent tasks, with
//! fail-fast cancellation and a markdown summary report (spec.md §4.8).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use uuid::Uuid;

use agentdock_core::Coordinator;
use agentdock_git::WorktreeAdapter;
use agentdock_sandbox::driver::{self, AuthMethod as DriverAuthMethod, ExecutionOptions, GitIdentity, GitIdentitySource};
use agentdock_sandbox::manager::SandboxManager;
use agentdock_sandbox::sync;
use agentdock_store::models::ExecutionMode;

use crate::error::ExecError;

#[derive(Clone, Debug)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    pub prompt: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct TaskResult {
    pub task_id: String,
    pub description: String,
    pub session_id: Option<String>,
    pub sandbox_id: Option<String>,
    pub worktree_path: Option<String>,
    pub status: TaskStatus,
    pub duration: Duration,
    pub files_changed: usize,
    pub output_path: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub cost_estimate: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ProgressUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub completed_tasks: usize,
    pub total_tasks: usize,
}

pub struct BatchConfig {
    pub tasks: Vec<TaskSpec>,
    pub max_concurrent: usize,
    pub fail_fast: bool,
    pub output_dir: PathBuf,
    pub repo_path: String,
    pub image: String,
    pub api_key_present: bool,
    pub budget_per_task: Option<f64>,
    pub timeout_minutes: u64,
}

/// Default bounded concurrency when a batch doesn't specify one.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Clone, Debug)]
pub struct BatchReport {
    pub batch_id: String,
    pub results: Vec<TaskResult>,
    pub success_count: usize,
    pub failure_count: usize,
    pub cancelled_count: usize,
    pub total_duration: Duration,
    pub sequential_duration: Duration,
    pub time_saved: Duration,
    pub total_files_changed: usize,
    pub total_cost: f64,
}

/// Run `config.tasks` against `max_concurrent` simultaneous sandboxes,
/// reporting progress via `on_progress`.
pub async fn run_batch<A, F>(
    coordinator: &Coordinator<A>,
    manager: &SandboxManager,
    config: BatchConfig,
    on_progress: F,
) -> Result<BatchReport, ExecError>
where
    A: WorktreeAdapter + Send + Sync,
    F: Fn(ProgressUpdate) + Send + Sync,
{
    use futures::stream::{self, StreamExt};

    let batch_id = Uuid::new_v4().to_string();
    std::fs::create_dir_all(&config.output_dir)?;

    let total = config.tasks.len();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let cancelled = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicUsize::new(0));
    let fail_fast = config.fail_fast;

    let batch_started = Instant::now();

    // `buffer_unordered` keeps at most `max_concurrent` of these futures
    // polled at once, all borrowing `coordinator`/`manager` for the
    // duration of this single `.await` — bounded concurrency without
    // requiring `tokio::spawn`'s `'static` task handles.
    let results: Vec<TaskResult> = stream::iter(config.tasks.into_iter().map(|task| {
        let permit = Arc::clone(&semaphore);
        let cancel_flag = Arc::clone(&cancelled);
        let completed_counter = Arc::clone(&completed);
        let on_progress = &on_progress;
        let repo_path = &config.repo_path;
        let image = &config.image;
        let api_key_present = config.api_key_present;
        let output_dir = &config.output_dir;
        let budget_per_task = config.budget_per_task;
        let timeout_minutes = config.timeout_minutes;

        async move {
            on_progress(ProgressUpdate {
                task_id: task.id.clone(),
                status: TaskStatus::Pending,
                message: "queued".to_owned(),
                completed_tasks: completed_counter.load(Ordering::SeqCst),
                total_tasks: total,
            });

            let result = if fail_fast && cancel_flag.load(Ordering::SeqCst) {
                cancelled_result(&task)
            } else {
                run_single_task(
                    coordinator,
                    manager,
                    &task,
                    repo_path,
                    image,
                    api_key_present,
                    budget_per_task,
                    timeout_minutes,
                    output_dir,
                    &permit,
                    &cancel_flag,
                    fail_fast,
                )
                .await
            };

            if fail_fast && result.status == TaskStatus::Failed {
                cancel_flag.store(true, Ordering::SeqCst);
            }

            completed_counter.fetch_add(1, Ordering::SeqCst);
            on_progress(ProgressUpdate {
                task_id: task.id.clone(),
                status: result.status,
                message: result.error.clone().unwrap_or_else(|| "ok".to_owned()),
                completed_tasks: completed_counter.load(Ordering::SeqCst),
                total_tasks: total,
            });

            result
        }
    }))
    .buffer_unordered(config.max_concurrent.max(1))
    .collect()
    .await;

    manager.cleanup_all().await;

    let total_duration = batch_started.elapsed();
    let sequential_duration: Duration = results.iter().map(|r| r.duration).sum();
    let success_count = results.iter().filter(|r| r.status == TaskStatus::Completed).count();
    let failure_count = results.iter().filter(|r| r.status == TaskStatus::Failed).count();
    let cancelled_count = results.iter().filter(|r| r.status == TaskStatus::Cancelled).count();
    let total_files_changed = results.iter().map(|r| r.files_changed).sum();
    let total_cost = results.iter().filter_map(|r| r.cost_estimate).sum();

    let report = BatchReport {
        batch_id,
        results,
        success_count,
        failure_count,
        cancelled_count,
        total_duration,
        sequential_duration,
        time_saved: sequential_duration.saturating_sub(total_duration),
        total_files_changed,
        total_cost,
    };

    write_summary_report(&config.output_dir.join("summary-report.md"), &report)?;
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn run_single_task<A: WorktreeAdapter + Send + Sync>(
    coordinator: &Coordinator<A>,
    manager: &SandboxManager,
    task: &TaskSpec,
    repo_path: &str,
    image: &str,
    api_key_present: bool,
    budget_per_task: Option<f64>,
    timeout_minutes: u64,
    output_dir: &Path,
    permit: &Arc<Semaphore>,
    cancel_flag: &Arc<AtomicBool>,
    fail_fast: bool,
) -> TaskResult {
    let _permit = match permit.acquire().await {
        Ok(p) => p,
        Err(_) => return failed_result(task, "semaphore closed"),
    };

    if fail_fast && cancel_flag.load(Ordering::SeqCst) {
        return cancelled_result(task);
    }

    let started = Instant::now();
    let pid = i64::from(std::process::id());

    let session = match coordinator.register(
        pid,
        repo_path,
        ExecutionMode::E2b,
        Some(task.prompt.clone()),
        None,
        "parallel-",
        agentdock_core::is_pid_alive,
    ) {
        Ok(registration) => registration.session,
        Err(err) => return failed_result_with_duration(task, &err.to_string(), started.elapsed()),
    };

    let sandbox_id = match manager.create(image, api_key_present).await {
        Ok(id) => id,
        Err(err) => {
            let _ = coordinator.release(&session.id, true);
            return failed_result_with_duration(task, &err.to_string(), started.elapsed());
        }
    };

    if let Some(limit) = budget_per_task {
        manager.set_budget_limit(&sandbox_id, limit);
    }

    if fail_fast && cancel_flag.load(Ordering::SeqCst) {
        manager.terminate(&sandbox_id).await;
        let _ = coordinator.release(&session.id, true);
        return cancelled_result(task);
    }

    let Some(sandbox) = manager.get(&sandbox_id) else {
        let _ = coordinator.release(&session.id, true);
        return failed_result_with_duration(task, "sandbox disappeared after creation", started.elapsed());
    };

    let tarball_path = output_dir.join(format!("{}.tar.gz", task.id));
    let tarball = match sync::create_tarball(Path::new(&session.worktree_path), &tarball_path, &[]) {
        Ok(t) => t,
        Err(err) => {
            manager.terminate(&sandbox_id).await;
            let _ = coordinator.release(&session.id, true);
            return failed_result_with_duration(task, &err.to_string(), started.elapsed());
        }
    };

    let upload = sync::upload(&tarball_path, sandbox.as_ref(), "/workspace").await;
    if !upload.success {
        manager.terminate(&sandbox_id).await;
        let _ = coordinator.release(&session.id, true);
        return failed_result_with_duration(
            task,
            upload.error.as_deref().unwrap_or("upload failed"),
            started.elapsed(),
        );
    }

    if fail_fast && cancel_flag.load(Ordering::SeqCst) {
        manager.terminate(&sandbox_id).await;
        let _ = coordinator.release(&session.id, true);
        return cancelled_result(task);
    }

    let options = ExecutionOptions {
        working_dir: "/workspace".to_owned(),
        timeout_minutes,
        auth_method: DriverAuthMethod::ApiKey,
        api_key: None,
        oauth_credentials: None,
        git_identity: GitIdentity {
            user: "agentdock".to_owned(),
            email: "agentdock@localhost".to_owned(),
            source: GitIdentitySource::Default,
        },
        local_repo_origin_url: None,
        remote_log_path: "/workspace/.agentdock-run.log".to_owned(),
        local_log_path: Some(output_dir.join(format!("{}.log", task.id)).to_string_lossy().into_owned()),
    };

    // The agent run is the one step long enough that a sibling failure can
    // land mid-execution; race it against the fail-fast flag so its sandbox
    // is torn down immediately instead of running to completion.
    let execution = tokio::select! {
        exec = driver::run(manager, &sandbox_id, sandbox.as_ref(), &task.prompt, &options) => exec,
        () = watch_for_cancellation(cancel_flag, fail_fast) => {
            manager.terminate(&sandbox_id).await;
            let _ = coordinator.release(&session.id, true);
            return cancelled_result(task);
        }
    };

    let download = sync::download_changed_files(sandbox.as_ref(), "/workspace", &output_dir.join(&task.id)).await;

    manager.terminate(&sandbox_id).await;
    let _ = coordinator.release(&session.id, true);

    match execution {
        Ok(exec_result) if exec_result.success => TaskResult {
            task_id: task.id.clone(),
            description: task.description.clone(),
            session_id: Some(session.id),
            sandbox_id: Some(sandbox_id),
            worktree_path: Some(session.worktree_path),
            status: TaskStatus::Completed,
            duration: started.elapsed(),
            files_changed: download.files_downloaded,
            output_path: Some(tarball.path),
            exit_code: Some(exec_result.exit_code),
            error: None,
            cost_estimate: Some(manager.estimate_cost(started.elapsed().as_secs() / 60)),
        },
        Ok(exec_result) => TaskResult {
            task_id: task.id.clone(),
            description: task.description.clone(),
            session_id: Some(session.id),
            sandbox_id: Some(sandbox_id),
            worktree_path: Some(session.worktree_path),
            status: TaskStatus::Failed,
            duration: started.elapsed(),
            files_changed: download.files_downloaded,
            output_path: Some(tarball.path),
            exit_code: Some(exec_result.exit_code),
            error: exec_result.error,
            cost_estimate: Some(manager.estimate_cost(started.elapsed().as_secs() / 60)),
        },
        Err(err) => failed_result_with_duration(task, &err.to_string(), started.elapsed()),
    }
}

/// Resolves once `cancel_flag` is set, or never if `fail_fast` is off — for
/// racing against a task's sandbox run via `tokio::select!`.
async fn watch_for_cancellation(cancel_flag: &AtomicBool, fail_fast: bool) {
    if !fail_fast {
        std::future::pending::<()>().await;
        return;
    }
    loop {
        if cancel_flag.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn failed_result(task: &TaskSpec, error: &str) -> TaskResult {
    failed_result_with_duration(task, error, Duration::ZERO)
}

fn failed_result_with_duration(task: &TaskSpec, error: &str, duration: Duration) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        description: task.description.clone(),
        session_id: None,
        sandbox_id: None,
        worktree_path: None,
        status: TaskStatus::Failed,
        duration,
        files_changed: 0,
        output_path: None,
        exit_code: None,
        error: Some(error.to_owned()),
        cost_estimate: None,
    }
}

fn cancelled_result(task: &TaskSpec) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        description: task.description.clone(),
        session_id: None,
        sandbox_id: None,
        worktree_path: None,
        status: TaskStatus::Cancelled,
        duration: Duration::ZERO,
        files_changed: 0,
        output_path: None,
        exit_code: None,
        error: Some("cancelled by fail-fast".to_owned()),
        cost_estimate: None,
    }
}

fn write_summary_report(path: &Path, report: &BatchReport) -> Result<(), ExecError> {
    let mut out = String::new();
    out.push_str(&format!("# Batch Report `{}`\n\n", report.batch_id));
    out.push_str(&format!(
        "- success: {} · failure: {} · cancelled: {}\n",
        report.success_count, report.failure_count, report.cancelled_count
    ));
    out.push_str(&format!(
        "- total duration: {:.1}s · sequential duration: {:.1}s · time saved: {:.1}s\n",
        report.total_duration.as_secs_f64(),
        report.sequential_duration.as_secs_f64(),
        report.time_saved.as_secs_f64()
    ));
    out.push_str(&format!(
        "- total files changed: {} · total cost: ${:.2}\n\n",
        report.total_files_changed, report.total_cost
    ));
    out.push_str("| Task | Status | Duration (s) | Files changed | Cost | Error |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for result in &report.results {
        out.push_str(&format!(
            "| {} | {:?} | {:.1} | {} | {} | {} |\n",
            result.description,
            result.status,
            result.duration.as_secs_f64(),
            result.files_changed,
            result.cost_estimate.map(|c| format!("${c:.2}")).unwrap_or_default(),
            result.error.clone().unwrap_or_default(),
        ));
    }
    std::fs::write(path, out)?;
    Ok(())
}

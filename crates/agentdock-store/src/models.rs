//! Entity types persisted by the store, matching spec.md §3's data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution mode a session runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Runs directly in the main repo or a local worktree.
    Local,
    /// Runs inside a remote sandbox.
    E2b,
}

impl ExecutionMode {
    /// Parse from the string stored in the `sessions.execution_mode` column.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "e2b" => Self::E2b,
            _ => Self::Local,
        }
    }

    /// Render as the string stored in the `sessions.execution_mode` column.
    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::E2b => "e2b",
        }
    }
}

/// Terminal/intermediate status of an `e2b`-mode session's sandbox run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxStatus {
    /// Sandbox created, agent not yet running.
    Initializing,
    /// Agent is executing.
    Running,
    /// Agent exited 0.
    Completed,
    /// Agent exited non-zero (and not a timeout).
    Failed,
    /// Execution was killed for exceeding its timeout.
    Timeout,
}

impl SandboxStatus {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "TIMEOUT" => Self::Timeout,
            _ => Self::Initializing,
        }
    }

    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

/// A registered agent process, bound to a repo and a worktree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub pid: i64,
    pub repo_path: String,
    pub worktree_path: String,
    pub worktree_name: Option<String>,
    pub is_main_repo: bool,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub execution_mode: ExecutionMode,
    pub sandbox_id: Option<String>,
    pub prompt: Option<String>,
    pub status: Option<SandboxStatus>,
    pub output_log: Option<String>,
    pub budget_limit: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub actual_cost: Option<f64>,
    pub template_name: Option<String>,
    pub git_user: Option<String>,
    pub git_email: Option<String>,
    pub ssh_key_provided: bool,
}

/// A file claim's locking mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimMode {
    Exclusive,
    Shared,
    Intent,
}

impl ClaimMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EXCLUSIVE" => Some(Self::Exclusive),
            "SHARED" => Some(Self::Shared),
            "INTENT" => Some(Self::Intent),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Exclusive => "EXCLUSIVE",
            Self::Shared => "SHARED",
            Self::Intent => "INTENT",
        }
    }

    /// The §4.2 compatibility matrix: can a claim in `self` coexist with a
    /// new request in `other` on the same file, for different sessions?
    #[must_use]
    pub const fn compatible_with(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Shared, Self::Shared)
                | (Self::Shared, Self::Intent)
                | (Self::Intent, Self::Shared)
                | (Self::Intent, Self::Intent)
        )
    }
}

/// A session's claim on a file path, in one of three modes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileClaim {
    pub id: String,
    pub session_id: String,
    pub repo_path: String,
    pub file_path: String,
    pub mode: ClaimMode,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub escalated_from: Option<ClaimMode>,
    pub reason: Option<String>,
}

/// Conflict type detected between concurrent edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    Trivial,
    ConcurrentEdit,
    Structural,
    Semantic,
}

/// File-scoped record of a detected conflict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id: String,
    pub file_path: String,
    pub conflict_type: ConflictType,
    pub strategy: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub auto_fix_suggestion_id: Option<String>,
}

/// A proposed resolution for a conflict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutoFixSuggestion {
    pub id: String,
    pub file_path: String,
    pub conflict_type: ConflictType,
    pub strategy: String,
    pub confidence: f64,
    pub explanation: String,
    pub generated_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub auto_applied: bool,
}

/// A subscription to merges of `branch_name` into `target_branch`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeSubscription {
    pub id: String,
    pub session_id: String,
    pub repo_path: String,
    pub branch_name: String,
    pub target_branch: String,
    pub satisfied: bool,
}

/// A detected merge of a subscribed branch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeEvent {
    pub id: String,
    pub repo_path: String,
    pub branch_name: String,
    pub target_branch: String,
    pub merged_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub source_commit: String,
    pub notification_sent: bool,
}

/// Budgeting period granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriodKind {
    Daily,
    Weekly,
    Monthly,
}

impl BudgetPeriodKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// Aggregate spend tracked over one budgeting period.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BudgetPeriod {
    pub period: BudgetPeriodKind,
    pub period_start: DateTime<Utc>,
    pub budget_limit: f64,
    pub spent: f64,
}

//! Sandbox Manager (C5): lifecycle, timeout enforcement, and budget
//! warnings over a process-local map of tracked sandboxes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::SandboxError;
use crate::provider::{Sandbox, SandboxProvider};

/// Default soft-warning elapsed-minute thresholds.
pub const DEFAULT_SOFT_THRESHOLDS: &[u64] = &[30, 50];
/// Default hard-timeout elapsed-minute threshold.
pub const DEFAULT_HARD_THRESHOLD: u64 = 60;
/// Default linear cost rate, USD per elapsed minute.
pub const DEFAULT_COST_PER_MINUTE: f64 = 0.05;

/// Severity of a timeout/budget warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningLevel {
    Soft,
    Hard,
}

/// Emitted by [`SandboxManager::enforce_timeout`].
#[derive(Clone, Debug)]
pub struct TimeoutWarning {
    pub level: WarningLevel,
    pub elapsed_minutes: u64,
    pub estimated_cost: f64,
}

/// Emitted by [`SandboxManager::enforce_timeout`] when a budget threshold is
/// crossed on the same tick.
#[derive(Clone, Debug)]
pub struct BudgetWarning {
    pub percent_of_limit: u8,
    pub estimated_cost: f64,
    pub limit: f64,
}

#[derive(Clone, Debug)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TerminateOutcome {
    pub success: bool,
    pub cleaned_up: bool,
}

struct Tracked {
    sandbox: Arc<dyn Sandbox>,
    created_at: DateTime<Utc>,
    soft_warned: HashSet<u64>,
    budget_limit: Option<f64>,
    budget_warned: HashSet<u8>,
    hard_threshold_minutes: u64,
}

/// Tracks every sandbox this process created, enforcing timeouts and budget
/// limits. Guarded by an internal mutex — process-local shared state, per
/// spec.md §5.
pub struct SandboxManager {
    provider: Arc<dyn SandboxProvider>,
    sandboxes: Mutex<HashMap<String, Tracked>>,
    cost_per_minute: f64,
    soft_thresholds: Vec<u64>,
}

impl SandboxManager {
    #[must_use]
    pub fn new(provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            provider,
            sandboxes: Mutex::new(HashMap::new()),
            cost_per_minute: DEFAULT_COST_PER_MINUTE,
            soft_thresholds: DEFAULT_SOFT_THRESHOLDS.to_vec(),
        }
    }

    /// Create a sandbox from `image`, after checking `api_key_present`.
    pub async fn create(&self, image: &str, api_key_present: bool) -> Result<String, SandboxError> {
        if !api_key_present {
            return Err(SandboxError::ApiKeyMissing);
        }
        let sandbox: Arc<dyn Sandbox> = self.provider.create(image).await?.into();
        let id = sandbox.id().to_owned();
        sandbox.set_timeout(DEFAULT_HARD_THRESHOLD * 60_000).await?;

        self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(
            id.clone(),
            Tracked {
                sandbox,
                created_at: Utc::now(),
                soft_warned: HashSet::new(),
                budget_limit: None,
                budget_warned: HashSet::new(),
                hard_threshold_minutes: DEFAULT_HARD_THRESHOLD,
            },
        );
        Ok(id)
    }

    /// Fetch the live handle for a tracked sandbox, for callers that need
    /// to run commands against it directly (the Execution Driver, File
    /// Sync).
    #[must_use]
    pub fn get(&self, sandbox_id: &str) -> Option<Arc<dyn Sandbox>> {
        self.sandboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(sandbox_id)
            .map(|t| Arc::clone(&t.sandbox))
    }

    /// Record a soft budget cap for `sandbox_id`.
    pub fn set_budget_limit(&self, sandbox_id: &str, amount_usd: f64) {
        let mut guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tracked) = guard.get_mut(sandbox_id) {
            tracked.budget_limit = Some(amount_usd);
        }
    }

    /// Estimate cost linearly in elapsed minutes, at `cost_per_minute`.
    #[must_use]
    pub fn estimate_cost(&self, elapsed_minutes: u64) -> f64 {
        elapsed_minutes as f64 * self.cost_per_minute
    }

    /// Check soft/hard timeout thresholds and budget crossings for
    /// `sandbox_id`, terminating it on a hard breach.
    pub async fn enforce_timeout(
        &self,
        sandbox_id: &str,
    ) -> Result<Option<(TimeoutWarning, Option<BudgetWarning>)>, SandboxError> {
        let (sandbox, created_at, hard_threshold, already_warned, budget_limit, budget_warned) = {
            let guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(tracked) = guard.get(sandbox_id) else {
                return Ok(None);
            };
            (
                Arc::clone(&tracked.sandbox),
                tracked.created_at,
                tracked.hard_threshold_minutes,
                tracked.soft_warned.clone(),
                tracked.budget_limit,
                tracked.budget_warned.clone(),
            )
        };

        let elapsed_minutes = u64::try_from((Utc::now() - created_at).num_minutes().max(0)).unwrap_or(0);
        let estimated_cost = self.estimate_cost(elapsed_minutes);
        let budget_warning = budget_limit.and_then(|limit| {
            [100_u8, 80].into_iter().find_map(|pct| {
                let crossed = estimated_cost >= limit * f64::from(pct) / 100.0;
                (crossed && !budget_warned.contains(&pct)).then_some(BudgetWarning {
                    percent_of_limit: pct,
                    estimated_cost,
                    limit,
                })
            })
        });

        if elapsed_minutes >= hard_threshold {
            let _ = sandbox.kill().await;
            self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(sandbox_id);
            return Ok(Some((
                TimeoutWarning {
                    level: WarningLevel::Hard,
                    elapsed_minutes,
                    estimated_cost,
                },
                budget_warning,
            )));
        }

        let next_soft = self
            .soft_thresholds
            .iter()
            .copied()
            .find(|t| *t <= elapsed_minutes && !already_warned.contains(t));

        if let Some(threshold) = next_soft {
            let mut guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(tracked) = guard.get_mut(sandbox_id) {
                tracked.soft_warned.insert(threshold);
            }
        }
        if let Some(warning) = &budget_warning {
            let mut guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(tracked) = guard.get_mut(sandbox_id) {
                tracked.budget_warned.insert(warning.percent_of_limit);
            }
        }

        Ok(next_soft.map(|threshold| {
            (
                TimeoutWarning {
                    level: WarningLevel::Soft,
                    elapsed_minutes: threshold,
                    estimated_cost,
                },
                budget_warning,
            )
        }))
    }

    /// Check liveness, optionally reconnecting if the handle was dropped
    /// (e.g. after a process restart).
    pub async fn monitor_health(&self, sandbox_id: &str, reconnect: bool) -> Result<HealthReport, SandboxError> {
        let existing = {
            let guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.get(sandbox_id).map(|t| Arc::clone(&t.sandbox))
        };

        let sandbox = match existing {
            Some(s) => s,
            None if reconnect => {
                let reconnected: Arc<dyn Sandbox> = self.provider.reconnect(sandbox_id).await?.into();
                reconnected
            }
            None => {
                return Ok(HealthReport {
                    is_healthy: false,
                    message: None,
                    error: Some(format!("sandbox '{sandbox_id}' is not tracked")),
                })
            }
        };

        match sandbox.is_running().await {
            Ok(true) => Ok(HealthReport {
                is_healthy: true,
                message: Some("running".to_owned()),
                error: None,
            }),
            Ok(false) => Ok(HealthReport {
                is_healthy: false,
                message: None,
                error: Some("sandbox process has exited".to_owned()),
            }),
            Err(err) => Ok(HealthReport {
                is_healthy: false,
                message: None,
                error: Some(err.to_string()),
            }),
        }
    }

    /// Idempotent terminate: never errors on "already gone".
    pub async fn terminate(&self, sandbox_id: &str) -> TerminateOutcome {
        let sandbox = {
            let mut guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.remove(sandbox_id).map(|t| t.sandbox)
        };
        let Some(sandbox) = sandbox else {
            return TerminateOutcome {
                success: true,
                cleaned_up: false,
            };
        };
        let success = sandbox.kill().await.is_ok();
        TerminateOutcome {
            success,
            cleaned_up: true,
        }
    }

    /// Best-effort terminate of every tracked sandbox.
    pub async fn cleanup_all(&self) {
        let ids: Vec<String> = {
            let guard = self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.keys().cloned().collect()
        };
        for id in ids {
            self.terminate(&id).await;
        }
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.sandboxes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;

    fn manager() -> SandboxManager {
        SandboxManager::new(Arc::new(MockProvider))
    }

    #[tokio::test]
    async fn create_without_api_key_fails_fast() {
        let mgr = manager();
        let err = mgr.create("base", false).await.unwrap_err();
        assert!(matches!(err, SandboxError::ApiKeyMissing));
    }

    #[tokio::test]
    async fn create_tracks_the_sandbox() {
        let mgr = manager();
        mgr.create("base", true).await.unwrap();
        assert_eq!(mgr.tracked_count(), 1);
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let mgr = manager();
        let id = mgr.create("base", true).await.unwrap();
        let first = mgr.terminate(&id).await;
        let second = mgr.terminate(&id).await;
        assert!(first.success && first.cleaned_up);
        assert!(second.success && !second.cleaned_up);
    }

    #[tokio::test]
    async fn monitor_health_reports_running() {
        let mgr = manager();
        let id = mgr.create("base", true).await.unwrap();
        let report = mgr.monitor_health(&id, false).await.unwrap();
        assert!(report.is_healthy);
    }

    #[tokio::test]
    async fn monitor_health_of_unknown_sandbox_without_reconnect_is_unhealthy() {
        let mgr = manager();
        let report = mgr.monitor_health("missing", false).await.unwrap();
        assert!(!report.is_healthy);
    }

    #[tokio::test]
    async fn enforce_timeout_below_threshold_emits_nothing() {
        let mgr = manager();
        let id = mgr.create("base", true).await.unwrap();
        let warning = mgr.enforce_timeout(&id).await.unwrap();
        assert!(warning.is_none());
    }

    #[test]
    fn estimate_cost_is_linear() {
        let mgr = manager();
        assert!((mgr.estimate_cost(10) - DEFAULT_COST_PER_MINUTE * 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn cleanup_all_terminates_every_tracked_sandbox() {
        let mgr = manager();
        mgr.create("base", true).await.unwrap();
        mgr.create("base", true).await.unwrap();
        mgr.cleanup_all().await;
        assert_eq!(mgr.tracked_count(), 0);
    }
}

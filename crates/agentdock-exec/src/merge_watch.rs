//! Merge Watcher (C10): polls subscribed branches for merges into their
//! target branch (spec.md §4.9).

use std::sync::Arc;
use std::time::Duration;

use agentdock_store::models::MergeEvent;
use agentdock_store::{time, Store};

use crate::error::ExecError;

/// Minimum poll interval accepted by [`watch_forever`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// A single source-branch history lookup, abstracted so tests don't need a
/// real repository: return the tip commit of `target_branch` if it contains
/// a commit matching `source_branch`'s tip, else `None`.
pub trait MergeHistory: Send + Sync {
    fn find_merge_commit(&self, repo_path: &str, source_branch: &str, target_branch: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct OnceReport {
    pub subscriptions_checked: usize,
    pub new_merges: Vec<MergeEvent>,
    pub notifications_sent: usize,
    pub errors: Vec<String>,
}

/// Run a single poll over every active subscription.
pub fn run_once(store: &Store, history: &dyn MergeHistory) -> Result<OnceReport, ExecError> {
    let mut report = OnceReport::default();
    let subscriptions = store.active_merge_subscriptions()?;
    report.subscriptions_checked = subscriptions.len();

    for subscription in subscriptions {
        match history.find_merge_commit(&subscription.repo_path, &subscription.branch_name, &subscription.target_branch)
        {
            Some(source_commit) => {
                let now = time::now();
                let event = MergeEvent {
                    id: uuid::Uuid::new_v4().to_string(),
                    repo_path: subscription.repo_path.clone(),
                    branch_name: subscription.branch_name.clone(),
                    target_branch: subscription.target_branch.clone(),
                    merged_at: now,
                    detected_at: now,
                    source_commit,
                    notification_sent: false,
                };
                if let Err(err) = store.insert_merge_event(&event) {
                    report.errors.push(err.to_string());
                    continue;
                }
                if let Err(err) = store.mark_subscription_satisfied(&subscription.id) {
                    report.errors.push(err.to_string());
                    continue;
                }
                report.new_merges.push(event);
            }
            None => continue,
        }
    }

    match send_notifications(store, &report.new_merges) {
        Ok(sent) => report.notifications_sent = sent,
        Err(err) => report.errors.push(err.to_string()),
    }

    Ok(report)
}

/// Mark every newly detected merge's notification as sent, returning the
/// count actually updated.
pub fn send_notifications(store: &Store, events: &[MergeEvent]) -> Result<usize, ExecError> {
    let mut sent = 0;
    for event in events {
        store.mark_event_notified(&event.id)?;
        sent += 1;
    }
    Ok(sent)
}

/// Poll forever at `interval` (clamped to [`MIN_POLL_INTERVAL`]) until a
/// shutdown signal arrives. `interval` below the minimum is an input error
/// the caller should validate before calling; this simply clamps.
pub async fn watch_forever(
    store: Arc<Store>,
    history: Arc<dyn MergeHistory>,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let interval = interval.max(MIN_POLL_INTERVAL);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_once(&store, history.as_ref()) {
                    Ok(report) => {
                        for err in &report.errors {
                            tracing::warn!(error = %err, "merge watcher poll error");
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "merge watcher poll failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("merge watcher shutting down");
                    break;
                }
            }
        }
    }
}

//! Polling fallback
//!
//! When webhook delivery is unavailable, a per-task poller queries the
//! render service on an interval and feeds observations through the same
//! apply path as the webhook handler. The poller stops when a terminal
//! outcome is applied (by either channel), when the task row disappears,
//! or when the poll budget is exhausted.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::provider::ProviderClient;
use crate::relay::RelayHandle;
use crate::store::{Store, TaskStatus};

use super::{apply_task_event, StopReason, TaskEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Give up after this many seconds without a terminal observation
    #[serde(default = "default_max_duration")]
    pub max_duration: u64,
}

fn default_interval() -> u64 {
    2000
}

fn default_max_duration() -> u64 {
    600
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_duration: default_max_duration(),
        }
    }
}

/// Spawn a poller for one task. Returns the join handle; callers normally
/// let it run detached.
pub fn spawn_poller(
    store: Arc<Store>,
    provider: Arc<ProviderClient>,
    relay: RelayHandle,
    task_id: String,
    config: PollerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(config.max_duration);
        let mut ticker = tokio::time::interval(Duration::from_millis(config.interval.max(100)));
        // The first tick completes immediately; skip it so the task has a
        // full interval before the first poll.
        ticker.tick().await;

        info!(task_id = %task_id, "Poller started");

        loop {
            ticker.tick().await;

            let task = match store.render_task(&task_id) {
                Ok(Some(task)) => task,
                Ok(None) => {
                    warn!(task_id = %task_id, "Task row gone; poller stopping");
                    return;
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Poller store read failed");
                    continue;
                }
            };

            if task.status != TaskStatus::Running {
                debug!(task_id = %task_id, "Task already terminal; poller stopping");
                return;
            }

            if Instant::now() >= deadline {
                warn!(task_id = %task_id, "Poll budget exhausted; recording failure");
                let timeout = TaskEvent::Stopped {
                    reason: StopReason::Timeout,
                    result: None,
                };
                if let Err(e) = apply_task_event(&store, &relay, &task, timeout).await {
                    warn!(task_id = %task_id, error = %e, "Failed to record poll timeout");
                }
                return;
            }

            match provider.task_status(&task_id).await {
                Ok(response) => {
                    let event = TaskEvent::from_poll(&response);
                    match apply_task_event(&store, &relay, &task, event).await {
                        Ok(outcome) if outcome.is_terminal() => {
                            info!(task_id = %task_id, ?outcome, "Poller observed terminal state");
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Terminal parse failures are already recorded
                            // on the rows; nothing left to poll for.
                            warn!(task_id = %task_id, error = %e, "Poller apply failed");
                            return;
                        }
                    }
                }
                Err(e) => {
                    // Transient upstream failure; keep polling.
                    warn!(task_id = %task_id, error = %e, "Poll request failed");
                }
            }
        }
    })
}

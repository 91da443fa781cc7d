//! Cooperative watchdog over running tasks.
//!
//! The watchdog never interrupts an in-flight provider call. It sets an
//! abort flag and writes the terminal task state; the orchestrators consult
//! the flag at round and item boundaries and unwind on their own.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::WatchdogConfig;
use crate::tasks::model::{epoch_ms, Progress};
use crate::tasks::TaskStore;

/// Shared state between one running task and its watchdog.
pub struct TaskHandle {
    aborted: AtomicBool,
    finished: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    started_ms: i64,
    last_progress_ms: AtomicI64,
    last_provider: Mutex<String>,
    last_batch_size: AtomicUsize,
}

impl TaskHandle {
    pub fn new() -> Arc<Self> {
        let now = epoch_ms();
        Arc::new(Self {
            aborted: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            started_ms: now,
            last_progress_ms: AtomicI64::new(now),
            last_provider: Mutex::new(String::new()),
            last_batch_size: AtomicUsize::new(0),
        })
    }

    /// Record activity; resets the idle clock.
    pub fn touch(&self) {
        self.last_progress_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn note_provider(&self, provider: &str) {
        if let Ok(mut guard) = self.last_provider.lock() {
            provider.clone_into(&mut guard);
        }
    }

    pub fn note_batch_size(&self, size: usize) {
        self.last_batch_size.store(size, Ordering::Relaxed);
    }

    pub fn abort(&self, reason: &str) {
        if let Ok(mut guard) = self.abort_reason.lock() {
            guard.get_or_insert_with(|| reason.to_string());
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn abort_reason(&self) -> Option<String> {
        self.abort_reason.lock().ok().and_then(|g| g.clone())
    }

    /// Mark the task as done so the watchdog loop exits.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn diagnostics(&self, now: i64) -> serde_json::Value {
        json!({
            "last_provider": self.last_provider.lock().map(|g| g.clone()).unwrap_or_default(),
            "last_batch_size": self.last_batch_size.load(Ordering::Relaxed),
            "elapsed_ms": now - self.started_ms,
            "idle_ms": now - self.last_progress_ms.load(Ordering::Relaxed),
        })
    }
}

/// Time budgets for one task run.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogBudget {
    pub idle_ms: i64,
    pub total_ms: i64,
}

impl WatchdogBudget {
    /// Total budget scales with the requested amount but never drops below
    /// the configured floor.
    pub fn for_amount(config: &WatchdogConfig, amount: usize) -> Self {
        Self {
            idle_ms: config.idle_ms as i64,
            total_ms: (config.min_total_ms as i64).max(amount as i64 * config.per_item_ms as i64),
        }
    }
}

/// Watch one running task until it finishes or a budget is exceeded.
///
/// On trip: abort flag first, then a final progress snapshot with
/// diagnostics, then the terminal failed status. The task's own later writes
/// bounce off the terminal row.
pub fn attach(
    store: TaskStore,
    task_id: String,
    handle: Arc<TaskHandle>,
    budget: WatchdogBudget,
    check_interval_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(check_interval_ms.max(100)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if handle.is_finished() || handle.is_aborted() {
                return;
            }

            let now = epoch_ms();
            let idle = now - handle.last_progress_ms.load(Ordering::Relaxed);
            let elapsed = now - handle.started_ms;

            let reason = if idle >= budget.idle_ms {
                Some(format!(
                    "Watchdog timeout: ingen aktivitet på {}s",
                    idle / 1000
                ))
            } else if elapsed >= budget.total_ms {
                Some(format!("Watchdog timeout: total tid {}s", elapsed / 1000))
            } else {
                None
            };

            let Some(reason) = reason else { continue };

            tracing::warn!(
                task_id = %task_id,
                idle_ms = idle,
                elapsed_ms = elapsed,
                "watchdog tripped — aborting task"
            );
            handle.abort(&reason);

            let progress =
                Progress::new("avbruten av watchdog", 0, 0).with_details(handle.diagnostics(now));
            if let Err(e) = store.update_progress(&task_id, &progress).await {
                tracing::error!(task_id = %task_id, err = %e, "failed to write watchdog progress");
            }
            if let Err(e) = store.fail(&task_id, &reason).await {
                tracing::error!(task_id = %task_id, err = %e, "failed to mark task failed");
            }
            return;
        }
    })
}

/// Fail any queued/processing task whose last update predates the idle
/// budget. Run at startup to clean up rows orphaned by a crash.
pub async fn sweep_stale_tasks(store: &TaskStore, config: &WatchdogConfig) -> Result<usize> {
    let cutoff = epoch_ms() - config.idle_ms as i64;
    let stale = store.stale_active(cutoff).await?;
    let mut swept = 0;
    for task in stale {
        let idle_s = (epoch_ms() - task.updated_at) / 1000;
        let reason = format!("Watchdog timeout: ingen aktivitet på {idle_s}s");
        tracing::warn!(task_id = %task.id, status = %task.status, "sweeping stale task");
        if store.fail(&task.id, &reason).await? {
            swept += 1;
        }
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchdogConfig;
    use crate::storage;
    use crate::tasks::model::TaskKind;

    fn test_config() -> WatchdogConfig {
        WatchdogConfig {
            idle_ms: 120_000,
            min_total_ms: 300_000,
            per_item_ms: 45_000,
            check_interval_ms: 50,
        }
    }

    #[test]
    fn budget_scales_with_amount_above_the_floor() {
        let config = test_config();
        assert_eq!(
            WatchdogBudget::for_amount(&config, 2).total_ms,
            300_000,
            "small amounts keep the floor"
        );
        assert_eq!(WatchdogBudget::for_amount(&config, 20).total_ms, 900_000);
    }

    #[test]
    fn first_abort_reason_wins() {
        let handle = TaskHandle::new();
        handle.abort("first");
        handle.abort("second");
        assert!(handle.is_aborted());
        assert_eq!(handle.abort_reason().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn idle_trip_fails_the_task_with_idle_reason() {
        let store = TaskStore::new(storage::open_memory().await.unwrap());
        let task = store.create(TaskKind::Generation, "{}").await.unwrap();
        store.mark_processing(&task.id).await.unwrap();

        let handle = TaskHandle::new();
        let budget = WatchdogBudget {
            idle_ms: 150,
            total_ms: 600_000,
        };
        let wd = attach(store.clone(), task.id.clone(), handle.clone(), budget, 100);
        wd.await.unwrap();

        assert!(handle.is_aborted());
        assert!(handle.abort_reason().unwrap().contains("ingen aktivitet"));
        let row = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert!(row.error.unwrap().contains("ingen aktivitet"));
        // Diagnostics land in the final progress snapshot.
        let progress = row.progress.unwrap();
        assert!(progress.contains("last_provider"));
    }

    #[tokio::test]
    async fn finished_handle_stops_the_watchdog_without_tripping() {
        let store = TaskStore::new(storage::open_memory().await.unwrap());
        let task = store.create(TaskKind::Generation, "{}").await.unwrap();

        let handle = TaskHandle::new();
        let budget = WatchdogBudget {
            idle_ms: 150,
            total_ms: 600_000,
        };
        handle.finish();
        let wd = attach(store.clone(), task.id.clone(), handle.clone(), budget, 50);
        wd.await.unwrap();

        let row = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(row.status, "queued", "watchdog must not touch the row");
    }

    #[tokio::test]
    async fn sweep_fails_orphaned_rows() {
        let store = TaskStore::new(storage::open_memory().await.unwrap());
        let task = store.create(TaskKind::Generation, "{}").await.unwrap();
        store.mark_processing(&task.id).await.unwrap();

        let config = WatchdogConfig {
            idle_ms: 0,
            ..test_config()
        };
        // idle_ms = 0 makes every active row immediately stale.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let swept = sweep_stale_tasks(&store, &config).await.unwrap();
        assert_eq!(swept, 1);

        let row = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert!(row.error.unwrap().contains("Watchdog timeout"));
    }
}

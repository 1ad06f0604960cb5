//! TaskRegistry implementation

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use eyre::{Result, eyre};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::types::{TaskGroup, TaskOutcome, TaskReport};

/// Bookkeeping for one running task
///
/// The registry exclusively owns the entry. `cancel` requests cooperative
/// cancellation; `finished` latches once the wrapper has cleaned up;
/// `outcome` is set exactly once, right before the latch fires.
struct TaskEntry {
    cancel: CancellationToken,
    finished: CancellationToken,
    outcome: Arc<OnceLock<TaskOutcome>>,
}

/// Registry of running background tasks, partitioned by [`TaskGroup`]
///
/// Cloning is cheap and shares the underlying task map; the completion
/// wrapper holds a clone so it can remove its own entry. The map is a single
/// mutex domain mutated by `add_task`/`remove_task` callers and by each
/// task's wrapper, so a wrapper's cleanup and a concurrent re-add for the
/// same id serialize rather than losing an update.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<TaskGroup, HashMap<String, TaskEntry>>>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let mut tasks = HashMap::new();
        for group in TaskGroup::ALL {
            tasks.insert(group, HashMap::new());
        }
        Self {
            tasks: Arc::new(Mutex::new(tasks)),
        }
    }

    /// Schedule `work` under `(group, task_id)`
    ///
    /// Returns false without scheduling anything if an entry already exists
    /// for that identity - the guard against double-starting a connection.
    /// The entry is removed again on any terminal outcome: completed, failed,
    /// or cancelled.
    pub fn add_task<F>(&self, task_id: impl Into<String>, group: TaskGroup, work: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let task_id = task_id.into();
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let outcome = Arc::new(OnceLock::new());

        {
            let mut tasks = self.tasks.lock().expect("task map mutex poisoned");
            let group_map = tasks.entry(group).or_default();
            if group_map.contains_key(&task_id) {
                debug!(%task_id, %group, "task already registered, rejecting add");
                return false;
            }
            group_map.insert(
                task_id.clone(),
                TaskEntry {
                    cancel: cancel.clone(),
                    finished: finished.clone(),
                    outcome: outcome.clone(),
                },
            );
        }

        let registry = self.clone();
        tokio::spawn(async move {
            info!(%task_id, %group, "task started");

            let result = tokio::select! {
                _ = cancel.cancelled() => TaskOutcome::Cancelled,
                res = work => match res {
                    Ok(()) => TaskOutcome::Completed,
                    Err(e) => TaskOutcome::Failed(format!("{e:#}")),
                },
            };

            match &result {
                TaskOutcome::Completed => info!(%task_id, %group, "task completed"),
                TaskOutcome::Cancelled => info!(%task_id, %group, "task cancelled"),
                TaskOutcome::Failed(reason) => error!(%task_id, %group, %reason, "task failed"),
            }

            let _ = outcome.set(result);
            // Remove before latching so waiters never observe a finished task
            // that is still present in the map.
            registry.remove_entry(&task_id, group);
            finished.cancel();
        });

        true
    }

    /// Request cancellation of `(group, task_id)`
    ///
    /// Returns true if a task was found. Cancellation completes
    /// asynchronously: the work future is dropped at its next suspension
    /// point, unwinds through `Drop`, and only then does the entry leave the
    /// registry. Callers must not assume the task has stopped on return.
    pub fn remove_task(&self, task_id: &str, group: TaskGroup) -> bool {
        let tasks = self.tasks.lock().expect("task map mutex poisoned");
        match tasks.get(&group).and_then(|g| g.get(task_id)) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(%task_id, %group, "task cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Await every currently-registered task across all groups
    ///
    /// Failures are captured per task, never propagated between siblings.
    /// With `strict` set, the aggregate call returns the first captured
    /// failure as an error after all tasks have settled.
    pub async fn run_all(&self, strict: bool) -> Result<Vec<TaskReport>> {
        let watched = self.snapshot(None);
        Self::await_reports(watched, strict).await
    }

    /// Await every currently-registered task in one group
    pub async fn run_group(&self, group: TaskGroup, strict: bool) -> Result<Vec<TaskReport>> {
        let watched = self.snapshot(Some(group));
        Self::await_reports(watched, strict).await
    }

    /// Number of registered tasks in a group
    pub fn task_count(&self, group: TaskGroup) -> usize {
        let tasks = self.tasks.lock().expect("task map mutex poisoned");
        tasks.get(&group).map(HashMap::len).unwrap_or(0)
    }

    /// Whether `(group, task_id)` is currently registered
    pub fn contains(&self, task_id: &str, group: TaskGroup) -> bool {
        let tasks = self.tasks.lock().expect("task map mutex poisoned");
        tasks.get(&group).is_some_and(|g| g.contains_key(task_id))
    }

    /// Ids of all registered tasks in a group, sorted
    pub fn active_ids(&self, group: TaskGroup) -> Vec<String> {
        let tasks = self.tasks.lock().expect("task map mutex poisoned");
        let mut ids: Vec<String> = tasks
            .get(&group)
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn remove_entry(&self, task_id: &str, group: TaskGroup) {
        let mut tasks = self.tasks.lock().expect("task map mutex poisoned");
        if let Some(group_map) = tasks.get_mut(&group) {
            group_map.remove(task_id);
        }
    }

    fn snapshot(
        &self,
        group: Option<TaskGroup>,
    ) -> Vec<(String, TaskGroup, CancellationToken, Arc<OnceLock<TaskOutcome>>)> {
        let tasks = self.tasks.lock().expect("task map mutex poisoned");
        tasks
            .iter()
            .filter(|(g, _)| group.is_none_or(|wanted| **g == wanted))
            .flat_map(|(g, group_map)| {
                group_map
                    .iter()
                    .map(|(id, entry)| (id.clone(), *g, entry.finished.clone(), entry.outcome.clone()))
            })
            .collect()
    }

    async fn await_reports(
        watched: Vec<(String, TaskGroup, CancellationToken, Arc<OnceLock<TaskOutcome>>)>,
        strict: bool,
    ) -> Result<Vec<TaskReport>> {
        let reports = join_all(watched.into_iter().map(|(task_id, group, finished, outcome)| async move {
            finished.cancelled().await;
            let outcome = outcome.get().cloned().unwrap_or(TaskOutcome::Cancelled);
            TaskReport {
                task_id,
                group,
                outcome,
            }
        }))
        .await;

        if strict {
            if let Some(failed) = reports.iter().find(|r| r.outcome.is_failure()) {
                let TaskOutcome::Failed(reason) = &failed.outcome else {
                    unreachable!()
                };
                return Err(eyre!(
                    "task {} in group {} failed: {}",
                    failed.task_id,
                    failed.group,
                    reason
                ));
            }
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_add_succeeds_duplicate_rejected() {
        let registry = TaskRegistry::new();

        assert!(registry.add_task("conn-1", TaskGroup::Connection, std::future::pending()));
        assert!(!registry.add_task("conn-1", TaskGroup::Connection, std::future::pending()));
        assert_eq!(registry.task_count(TaskGroup::Connection), 1);
    }

    #[tokio::test]
    async fn test_same_id_allowed_across_groups() {
        let registry = TaskRegistry::new();

        assert!(registry.add_task("conn-1", TaskGroup::Connection, std::future::pending()));
        assert!(registry.add_task("conn-1", TaskGroup::RateLimiter, std::future::pending()));
        assert_eq!(registry.task_count(TaskGroup::Connection), 1);
        assert_eq!(registry.task_count(TaskGroup::RateLimiter), 1);
    }

    #[tokio::test]
    async fn test_completion_removes_entry() {
        let registry = TaskRegistry::new();

        registry.add_task("quick", TaskGroup::Connection, async { Ok(()) });
        let reports = registry.run_group(TaskGroup::Connection, false).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, TaskOutcome::Completed);
        assert!(!registry.contains("quick", TaskGroup::Connection));
    }

    #[tokio::test]
    async fn test_remove_task_cancels_and_eventually_removes() {
        let registry = TaskRegistry::new();

        registry.add_task("long", TaskGroup::Connection, std::future::pending());
        assert!(registry.remove_task("long", TaskGroup::Connection));

        let reports = registry.run_group(TaskGroup::Connection, false).await.unwrap();
        assert_eq!(reports[0].outcome, TaskOutcome::Cancelled);
        assert!(!registry.contains("long", TaskGroup::Connection));
        // a second remove finds nothing
        assert!(!registry.remove_task("long", TaskGroup::Connection));
    }

    #[tokio::test]
    async fn test_failure_is_captured_not_propagated() {
        let registry = TaskRegistry::new();

        registry.add_task("bad", TaskGroup::Connection, async { Err(eyre!("boom")) });
        registry.add_task("good", TaskGroup::Connection, async { Ok(()) });

        let mut reports = registry.run_all(false).await.unwrap();
        reports.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].outcome, TaskOutcome::Failed(_)));
        assert_eq!(reports[1].outcome, TaskOutcome::Completed);
    }

    #[tokio::test]
    async fn test_strict_run_surfaces_failure() {
        let registry = TaskRegistry::new();

        registry.add_task("bad", TaskGroup::Connection, async { Err(eyre!("boom")) });
        let result = registry.run_all(true).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_id_reusable_after_completion() {
        let registry = TaskRegistry::new();

        registry.add_task("conn-2", TaskGroup::Connection, async { Ok(()) });
        registry.run_group(TaskGroup::Connection, false).await.unwrap();

        assert!(registry.add_task("conn-2", TaskGroup::Connection, std::future::pending()));
    }

    #[tokio::test]
    async fn test_cancelled_task_unwinds_through_drop() {
        struct Cleanup(std::sync::Arc<std::sync::atomic::AtomicBool>);
        impl Drop for Cleanup {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let registry = TaskRegistry::new();
        let dropped = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = dropped.clone();

        registry.add_task("session", TaskGroup::Connection, async move {
            let _cleanup = Cleanup(flag);
            std::future::pending::<()>().await;
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.remove_task("session", TaskGroup::Connection);
        registry.run_group(TaskGroup::Connection, false).await.unwrap();

        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_active_ids_sorted() {
        let registry = TaskRegistry::new();

        registry.add_task("b", TaskGroup::Connection, std::future::pending());
        registry.add_task("a", TaskGroup::Connection, std::future::pending());

        assert_eq!(registry.active_ids(TaskGroup::Connection), vec!["a", "b"]);
    }
}

//! The scheduling loop (SPEC_FULL.md §4.6): repeatedly pick the
//! leftmost non-complete leaf whose host politeness delay has
//! expired, execute one unit of work inside a bulkhead, yield back.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::sleep_until;

use crate::bulkhead::run_bulkhead;
use crate::dedup::DedupRegistry;
use crate::executor::TaskExecutor;
use crate::politeness::Politeness;
use crate::task::{Priority, Task, TaskKind, TaskPayload};

pub struct Scheduler {
    root: Arc<Task>,
    executor: Arc<dyn TaskExecutor>,
    politeness: Politeness,
    dedup: DedupRegistry,
    notify: Notify,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self::with_politeness(executor, Politeness::default())
    }

    pub fn with_politeness(executor: Arc<dyn TaskExecutor>, politeness: Politeness) -> Self {
        Self { root: Task::root(), executor, politeness, dedup: DedupRegistry::new(), notify: Notify::new() }
    }

    pub fn root(&self) -> &Arc<Task> {
        &self.root
    }

    /// Requests a body download for `resource_id`, returning the
    /// in-flight task (new or reused). A request made while an
    /// equivalent background task is already in flight escalates it
    /// instead of starting a duplicate (SPEC_FULL.md §4.6).
    pub fn download_resource_body(&self, resource_id: i64, host: Option<String>, priority: Priority) -> Arc<Task> {
        if let Some(existing) = self.dedup.get(resource_id, TaskKind::DownloadResourceBody) {
            existing.escalate(priority);
            self.notify.notify_one();
            return existing;
        }
        let task = Task::new(TaskPayload::DownloadResourceBody { resource_id, host }, priority);
        self.dedup.register(resource_id, TaskKind::DownloadResourceBody, &task);
        self.root.add_child(task.clone());
        self.notify.notify_one();
        task
    }

    /// Requests a body-plus-embedded-subresources download for
    /// `resource_id` (SPEC_FULL.md §4.6's `DownloadResourceTask`),
    /// deduplicating and escalating the same way
    /// [`Scheduler::download_resource_body`] does.
    pub fn download_resource(&self, resource_id: i64, host: Option<String>, priority: Priority) -> Arc<Task> {
        if let Some(existing) = self.dedup.get(resource_id, TaskKind::DownloadResource) {
            existing.escalate(priority);
            self.notify.notify_one();
            return existing;
        }
        let task = Task::new(TaskPayload::DownloadResource { resource_id, host }, priority);
        self.dedup.register(resource_id, TaskKind::DownloadResource, &task);
        self.root.add_child(task.clone());
        self.notify.notify_one();
        task
    }

    /// Submits an arbitrary unit of work as a top-level child, with no
    /// deduplication. Used for payloads that aren't keyed on a single
    /// resource id, e.g. group membership refreshes.
    pub fn submit(&self, payload: TaskPayload, priority: Priority) -> Arc<Task> {
        let task = Task::new(payload, priority);
        self.root.add_child(task.clone());
        self.notify.notify_one();
        task
    }

    pub fn cancel_all(&self) {
        self.root.cancel_tree();
        self.notify.notify_one();
    }

    /// Finds a task anywhere in the tree by id, for progress reporting.
    pub fn find_task(&self, id: u64) -> Option<Arc<Task>> {
        self.root.find(id)
    }

    /// Runs until every task in the tree is complete, cancelled or
    /// crashed. Exits early (without draining remaining work) once
    /// `cancel_all` marks the root's subtree cancelled and no further
    /// leaves remain ready.
    pub async fn run(&self) {
        loop {
            let leaves = self.root.leftmost_incomplete_leaves();
            if leaves.is_empty() {
                return;
            }

            // Highest priority wins; ties go to the leftmost (first
            // in DFS order) candidate, so fold rather than
            // `max_by_key` (which would keep the *last* of equal
            // elements).
            let ready = leaves.iter().filter(|task| self.politeness.is_ready(task.payload.host())).fold(
                None,
                |best: Option<&Arc<Task>>, task| match best {
                    Some(current) if task.priority() <= current.priority() => Some(current),
                    _ => Some(task),
                },
            );

            let Some(task) = ready else {
                let earliest = leaves.iter().map(|task| self.politeness.ready_at(task.payload.host())).min().unwrap();
                tokio::select! {
                    _ = sleep_until(tokio::time::Instant::from_std(earliest)) => {},
                    _ = self.notify.notified() => {},
                }
                continue;
            };

            if task.is_cancelled() {
                task.mark_complete();
                continue;
            }

            let host = task.payload.host().map(str::to_string);
            let payload = task.payload.clone();
            let completed = run_bulkhead(task, self.executor.execute(task, &payload)).await;
            if host.is_some() {
                self.politeness.record_download(host.as_deref());
            }
            if completed {
                task.mark_complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for CountingExecutor {
        async fn execute(&self, _task: &Task, _payload: &TaskPayload) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn running_with_no_tasks_returns_immediately() {
        let scheduler = Scheduler::new(Arc::new(CountingExecutor { calls: AtomicUsize::new(0) }));
        scheduler.run().await;
    }

    #[tokio::test]
    async fn a_submitted_task_is_executed_and_completed() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::with_politeness(executor.clone(), Politeness::new(Duration::ZERO));
        let task = scheduler.download_resource_body(1, None, Priority::Normal);
        scheduler.run().await;
        assert!(task.is_complete());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requesting_the_same_resource_twice_reuses_the_task_and_escalates() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::with_politeness(executor, Politeness::new(Duration::ZERO));
        let first = scheduler.download_resource_body(5, None, Priority::Background);
        let second = scheduler.download_resource_body(5, None, Priority::Interactive);
        assert_eq!(first.id, second.id);
        assert_eq!(first.priority(), Priority::Interactive);
    }

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(&self, _task: &Task, _payload: &TaskPayload) -> Result<()> {
            exn::bail!(crate::error::ErrorKind::Model)
        }
    }

    #[tokio::test]
    async fn a_crashed_task_is_left_incomplete_and_never_redispatched() {
        let scheduler = Scheduler::with_politeness(Arc::new(FailingExecutor), Politeness::new(Duration::ZERO));
        let task = scheduler.download_resource_body(9, None, Priority::Normal);
        scheduler.run().await;
        assert!(!task.is_complete());
        assert!(task.has_crashed());
    }

    #[tokio::test]
    async fn submit_runs_an_unkeyed_payload_exactly_once() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::with_politeness(executor.clone(), Politeness::new(Duration::ZERO));
        let task = scheduler.submit(TaskPayload::UpdateResourceGroupMembers { group_id: 1 }, Priority::Normal);
        scheduler.run().await;
        assert!(task.is_complete());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn find_task_locates_a_submitted_task_by_id() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::with_politeness(executor, Politeness::new(Duration::ZERO));
        let task = scheduler.download_resource_body(3, None, Priority::Normal);
        assert_eq!(scheduler.find_task(task.id).unwrap().id, task.id);
        assert!(scheduler.find_task(task.id + 1000).is_none());
    }

    #[tokio::test]
    async fn two_hosts_are_dispatched_independently_of_politeness_on_the_other() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::with_politeness(executor.clone(), Politeness::new(Duration::from_secs(60)));
        scheduler.download_resource_body(1, Some("a.test".to_string()), Priority::Normal);
        scheduler.download_resource_body(2, Some("b.test".to_string()), Priority::Normal);
        scheduler.run().await;
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }
}

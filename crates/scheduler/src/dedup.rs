//! Deduplication of in-flight downloads via weak references
//! (SPEC_FULL.md §4.6, §9: pointer graphs → arena + ids). A resource
//! with an in-flight task of a given kind hands out the existing task
//! instead of starting a duplicate; the entry clears itself once the
//! task is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::task::{Task, TaskKind};

#[derive(Default)]
pub struct DedupRegistry {
    in_flight: Mutex<HashMap<(i64, TaskKind), Weak<Task>>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing in-flight task for `(resource_id, kind)`,
    /// if its weak reference is still live.
    pub fn get(&self, resource_id: i64, kind: TaskKind) -> Option<Arc<Task>> {
        self.in_flight.lock().unwrap().get(&(resource_id, kind)).and_then(Weak::upgrade)
    }

    /// Registers `task` as the in-flight task for `(resource_id,
    /// kind)`. Callers must only do this after confirming via
    /// [`DedupRegistry::get`] that no live task already occupies the
    /// slot.
    pub fn register(&self, resource_id: i64, kind: TaskKind, task: &Arc<Task>) {
        self.in_flight.lock().unwrap().insert((resource_id, kind), Arc::downgrade(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskPayload};

    #[test]
    fn a_second_request_for_the_same_resource_reuses_the_in_flight_task() {
        let registry = DedupRegistry::new();
        let task = Task::new(TaskPayload::DownloadResourceBody { resource_id: 1, host: None }, Priority::Normal);
        registry.register(1, TaskKind::DownloadResourceBody, &task);

        let found = registry.get(1, TaskKind::DownloadResourceBody).unwrap();
        assert_eq!(found.id, task.id);
    }

    #[test]
    fn a_dropped_task_is_no_longer_returned() {
        let registry = DedupRegistry::new();
        let task = Task::new(TaskPayload::DownloadResourceBody { resource_id: 2, host: None }, Priority::Normal);
        registry.register(2, TaskKind::DownloadResourceBody, &task);
        drop(task);
        assert!(registry.get(2, TaskKind::DownloadResourceBody).is_none());
    }

    #[test]
    fn different_kinds_for_the_same_resource_do_not_collide() {
        let registry = DedupRegistry::new();
        let body = Task::new(TaskPayload::DownloadResourceBody { resource_id: 3, host: None }, Priority::Normal);
        registry.register(3, TaskKind::DownloadResourceBody, &body);
        assert!(registry.get(3, TaskKind::DownloadResource).is_none());
    }
}

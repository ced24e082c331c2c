//! The task tree (SPEC_FULL.md §4.6): every user-visible concurrent
//! operation is a node with typed children, a priority, a completion
//! flag and a `crash_reason` set by the bulkhead wrapper.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// From a live HTTP request, from a queued user action, or
/// opportunistic background work — ordered so that `Interactive >
/// Normal > Background`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Background,
    Normal,
    Interactive,
}

/// What a task actually does once dispatched. Link extraction is an
/// external collaborator (pure function `bytes -> links`, out of
/// scope per SPEC_FULL.md §1); everything else here is core.
#[derive(Debug, Clone)]
pub enum TaskPayload {
    DownloadResourceBody { resource_id: i64, host: Option<String> },
    DownloadResource { resource_id: i64, host: Option<String> },
    ParseLinks { resource_id: i64, revision_id: i64 },
    DownloadResourceGroupMembers { group_id: i64 },
    DownloadResourceGroup { group_id: i64 },
    UpdateResourceGroupMembers { group_id: i64 },
    Root,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::DownloadResourceBody { .. } => TaskKind::DownloadResourceBody,
            TaskPayload::DownloadResource { .. } => TaskKind::DownloadResource,
            TaskPayload::ParseLinks { .. } => TaskKind::ParseLinks,
            TaskPayload::DownloadResourceGroupMembers { .. } => TaskKind::DownloadResourceGroupMembers,
            TaskPayload::DownloadResourceGroup { .. } => TaskKind::DownloadResourceGroup,
            TaskPayload::UpdateResourceGroupMembers { .. } => TaskKind::UpdateResourceGroupMembers,
            TaskPayload::Root => TaskKind::Root,
        }
    }

    /// The host a politeness delay applies to, if this unit of work
    /// issues a download.
    pub fn host(&self) -> Option<&str> {
        match self {
            TaskPayload::DownloadResourceBody { host, .. } => host.as_deref(),
            TaskPayload::DownloadResource { host, .. } => host.as_deref(),
            _ => None,
        }
    }

    /// The resource a dedup lookup keys on, if any.
    pub fn resource_id(&self) -> Option<i64> {
        match self {
            TaskPayload::DownloadResourceBody { resource_id, .. }
            | TaskPayload::DownloadResource { resource_id, .. }
            | TaskPayload::ParseLinks { resource_id, .. } => Some(*resource_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    DownloadResourceBody,
    DownloadResource,
    ParseLinks,
    DownloadResourceGroupMembers,
    DownloadResourceGroup,
    UpdateResourceGroupMembers,
    Root,
}

pub struct Task {
    pub id: u64,
    pub payload: TaskPayload,
    priority: Mutex<Priority>,
    complete: AtomicBool,
    cancel_pending: AtomicBool,
    crash_reason: Mutex<Option<String>>,
    children: Mutex<Vec<std::sync::Arc<Task>>>,
}

impl Task {
    pub fn new(payload: TaskPayload, priority: Priority) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst),
            payload,
            priority: Mutex::new(priority),
            complete: AtomicBool::new(false),
            cancel_pending: AtomicBool::new(false),
            crash_reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
        })
    }

    pub fn root() -> std::sync::Arc<Self> {
        Self::new(TaskPayload::Root, Priority::Background)
    }

    pub fn priority(&self) -> Priority {
        *self.priority.lock().unwrap()
    }

    /// Raises this task's priority in place; never lowers it
    /// (SPEC_FULL.md §4.6: an interactive request escalates an
    /// in-flight background task, it never demotes one).
    pub fn escalate(&self, to: Priority) {
        let mut guard = self.priority.lock().unwrap();
        if to > *guard {
            *guard = to;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_pending.load(Ordering::SeqCst)
    }

    /// Marks this task and every descendant cancel-pending.
    pub fn cancel_tree(&self) {
        self.cancel_pending.store(true, Ordering::SeqCst);
        for child in self.children.lock().unwrap().iter() {
            child.cancel_tree();
        }
    }

    pub fn crash_reason(&self) -> Option<String> {
        self.crash_reason.lock().unwrap().clone()
    }

    pub fn set_crash_reason(&self, reason: String) {
        *self.crash_reason.lock().unwrap() = Some(reason);
    }

    pub fn has_crashed(&self) -> bool {
        self.crash_reason.lock().unwrap().is_some()
    }

    pub fn add_child(&self, child: std::sync::Arc<Task>) {
        self.children.lock().unwrap().push(child);
    }

    pub fn children(&self) -> Vec<std::sync::Arc<Task>> {
        self.children.lock().unwrap().clone()
    }

    /// True once this task and every descendant is complete.
    pub fn is_tree_complete(&self) -> bool {
        self.is_complete() && self.children().iter().all(|c| c.is_tree_complete())
    }

    /// `(completed, total)` counted over this task and every
    /// descendant, for progress reporting.
    pub fn tree_progress(&self) -> (u64, u64) {
        let mut completed = if self.is_complete() { 1 } else { 0 };
        let mut total = 1;
        for child in self.children() {
            let (c, t) = child.tree_progress();
            completed += c;
            total += t;
        }
        (completed, total)
    }

    /// True if this task or any descendant recorded a crash.
    pub fn tree_has_crashed(&self) -> bool {
        self.has_crashed() || self.children().iter().any(|c| c.tree_has_crashed())
    }

    pub(crate) fn find(self: &std::sync::Arc<Self>, id: u64) -> Option<std::sync::Arc<Task>> {
        if self.id == id {
            return Some(self.clone());
        }
        for child in self.children() {
            if let Some(found) = child.find(id) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first, leftmost-first walk collecting every leaf
    /// (childless, or all children already tree-complete) that is
    /// itself not yet complete and not cancelled.
    pub fn leftmost_incomplete_leaves(self: &std::sync::Arc<Self>) -> Vec<std::sync::Arc<Task>> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(self: &std::sync::Arc<Self>, out: &mut Vec<std::sync::Arc<Task>>) {
        if self.is_complete() || self.is_cancelled() || self.has_crashed() {
            return;
        }
        let children = self.children();
        if children.is_empty() {
            if !matches!(self.payload, TaskPayload::Root) {
                out.push(self.clone());
            }
            return;
        }
        for child in &children {
            child.collect_leaves(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalate_never_lowers_priority() {
        let task = Task::new(TaskPayload::Root, Priority::Interactive);
        task.escalate(Priority::Background);
        assert_eq!(task.priority(), Priority::Interactive);
        task.escalate(Priority::Interactive);
        assert_eq!(task.priority(), Priority::Interactive);
    }

    #[test]
    fn cancel_tree_marks_every_descendant() {
        let root = Task::root();
        let child = Task::new(TaskPayload::DownloadResourceBody { resource_id: 1, host: None }, Priority::Normal);
        root.add_child(child.clone());
        root.cancel_tree();
        assert!(child.is_cancelled());
    }

    #[test]
    fn a_leaf_with_an_incomplete_child_is_not_itself_a_leaf() {
        let root = Task::root();
        let parent = Task::new(TaskPayload::DownloadResource { resource_id: 1, host: None }, Priority::Normal);
        let child = Task::new(TaskPayload::DownloadResourceBody { resource_id: 1, host: None }, Priority::Normal);
        parent.add_child(child.clone());
        root.add_child(parent.clone());

        let leaves = root.leftmost_incomplete_leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id, child.id);
    }

    #[test]
    fn tree_progress_counts_the_root_and_every_child() {
        let root = Task::root();
        let a = Task::new(TaskPayload::DownloadResourceBody { resource_id: 1, host: None }, Priority::Normal);
        let b = Task::new(TaskPayload::DownloadResourceBody { resource_id: 2, host: None }, Priority::Normal);
        a.mark_complete();
        root.add_child(a);
        root.add_child(b);
        assert_eq!(root.tree_progress(), (1, 3));
    }

    #[test]
    fn find_locates_a_descendant_by_id() {
        let root = Task::root();
        let child = Task::new(TaskPayload::DownloadResourceBody { resource_id: 1, host: None }, Priority::Normal);
        root.add_child(child.clone());
        assert_eq!(root.find(child.id).unwrap().id, child.id);
        assert!(root.find(child.id + 1000).is_none());
    }

    #[test]
    fn a_completed_leaf_is_excluded() {
        let root = Task::root();
        let child = Task::new(TaskPayload::DownloadResourceBody { resource_id: 1, host: None }, Priority::Normal);
        child.mark_complete();
        root.add_child(child);
        assert!(root.leftmost_incomplete_leaves().is_empty());
    }
}

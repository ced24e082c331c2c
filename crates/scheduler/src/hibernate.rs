//! Hibernation snapshot/restore (SPEC_FULL.md §4.6): on close with
//! incomplete work, serialize the root task's top-level children so
//! the next open can pick up where it left off.

use std::sync::Arc;

use exn::ResultExt;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::task::{Priority, Task, TaskPayload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotEntry {
    Resource { resource_id: i64 },
    Group { group_id: i64, last_downloaded_member_id: Option<i64> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
}

/// Captures every incomplete top-level child of `root` as a
/// [`SnapshotEntry`]. `group_progress` supplies each group's
/// `last_downloaded_member_id` (owned by the database, not the task
/// tree — see `resource_group.last_downloaded_member_id`).
pub fn snapshot(root: &Arc<Task>, group_progress: impl Fn(i64) -> Option<i64>) -> Snapshot {
    let mut entries = Vec::new();
    for child in root.children() {
        if child.is_tree_complete() {
            continue;
        }
        match &child.payload {
            TaskPayload::DownloadResource { resource_id, .. } | TaskPayload::DownloadResourceBody { resource_id, .. } => {
                entries.push(SnapshotEntry::Resource { resource_id: *resource_id });
            }
            TaskPayload::DownloadResourceGroup { group_id } | TaskPayload::DownloadResourceGroupMembers { group_id } => {
                entries.push(SnapshotEntry::Group {
                    group_id: *group_id,
                    last_downloaded_member_id: group_progress(*group_id),
                });
            }
            _ => {}
        }
    }
    Snapshot { entries }
}

/// Reinstates a snapshot's entries as new top-level children of
/// `root`, at background priority (a restored task re-earns its
/// priority from whatever requests it again). Restored download tasks
/// carry no host yet — the scheduler resolves it the first time it
/// actually dispatches the task, at the cost of that first dispatch
/// not being politeness-delayed against pre-hibernation activity.
pub fn restore(root: &Arc<Task>, snapshot: Snapshot) {
    for entry in snapshot.entries {
        let task = match entry {
            SnapshotEntry::Resource { resource_id } => {
                Task::new(TaskPayload::DownloadResource { resource_id, host: None }, Priority::Background)
            }
            SnapshotEntry::Group { group_id, .. } => {
                Task::new(TaskPayload::DownloadResourceGroup { group_id }, Priority::Background)
            }
        };
        root.add_child(task);
    }
}

pub fn encode(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string(snapshot).or_raise(|| ErrorKind::Snapshot)
}

pub fn decode(raw: &str) -> Result<Snapshot> {
    serde_json::from_str(raw).or_raise(|| ErrorKind::Snapshot)
}

//! The bulkhead (SPEC_FULL.md §4.6, §10.5, grounded in
//! `util/bulkheads.py`): check-already-crashed, then execute, then
//! catch-and-record. One misbehaving task never takes down the
//! scheduler thread.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::task::Task;

/// Runs `unit` for `task` inside a bulkhead. Returns `false` without
/// running anything if the task has already crashed; otherwise runs
/// it, capturing both ordinary errors and panics into
/// `task.crash_reason`, and returns whether it completed cleanly.
pub async fn run_bulkhead<Fut, E>(task: &Task, unit: Fut) -> bool
where
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    if task.has_crashed() {
        return false;
    }

    match AssertUnwindSafe(unit).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            let reason = err.to_string();
            tracing::error!(task_id = task.id, error = %reason, "task unit failed");
            task.set_crash_reason(reason);
            false
        }
        Err(panic) => {
            let reason = panic_message(&panic);
            tracing::error!(task_id = task.id, error = %reason, "task unit panicked");
            task.set_crash_reason(reason);
            false
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

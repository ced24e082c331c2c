//! `/_/crystal/download-progress?task_id=<id>` (SPEC_FULL.md §4.7): a
//! Server-Sent Events stream reporting one task tree's progress until
//! it completes or five minutes elapse.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use std::collections::HashMap;

use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Serialize)]
struct ProgressEvent {
    status: &'static str,
    progress: u64,
    completed: bool,
    total: u64,
    message: Option<String>,
}

pub async fn download_progress(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_id: Option<u64> = params.get("task_id").and_then(|v| v.parse().ok());

    let stream = async_stream::stream! {
        let Some(task_id) = task_id else {
            yield Ok(Event::default().json_data(ProgressEvent {
                status: "error",
                progress: 0,
                completed: true,
                total: 0,
                message: Some("missing task_id".to_string()),
            }).expect("ProgressEvent always serializes"));
            return;
        };
        let Some(task) = state.scheduler.find_task(task_id) else {
            yield Ok(Event::default().json_data(ProgressEvent {
                status: "error",
                progress: 0,
                completed: true,
                total: 0,
                message: Some("unknown task_id".to_string()),
            }).expect("ProgressEvent always serializes"));
            return;
        };

        let deadline = tokio::time::Instant::now() + MAX_DURATION;
        loop {
            let (progress, total) = task.tree_progress();
            let crashed = task.tree_has_crashed();
            let done = task.is_tree_complete() || task.is_cancelled();
            let status = if crashed { "crashed" } else if done { "done" } else { "running" };
            let message = task.crash_reason();

            yield Ok(Event::default().json_data(ProgressEvent {
                status,
                progress,
                completed: done,
                total,
                message,
            }).expect("ProgressEvent always serializes"));

            if done || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

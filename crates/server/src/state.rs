//! Shared application state handed to every route (SPEC_FULL.md §4.7).

use std::sync::Arc;

use crystal_model::Project;
use crystal_scheduler::{task::Priority, Scheduler};

/// Everything a handler needs: the open project, its scheduler, and
/// the address this server is reachable at (used to build absolute
/// request URLs for things like SSE reconnection hints).
#[derive(Clone)]
pub struct AppState {
    pub project: Arc<Project>,
    pub scheduler: Arc<Scheduler>,
    pub bind: Arc<str>,
}

impl AppState {
    pub fn new(project: Arc<Project>, scheduler: Arc<Scheduler>, bind: impl Into<Arc<str>>) -> Self {
        Self { project, scheduler, bind: bind.into() }
    }

    /// Requests downloading `resource_id` at the given priority and
    /// runs the scheduler to completion for that one task, as step 2
    /// of "Serving an archive URL" (SPEC_FULL.md §4.7) requires:
    /// blocking until the top-level body exists while embedded work
    /// keeps running in the background.
    pub async fn download_and_wait_for_body(&self, resource_id: i64, host: Option<String>) {
        let task = self.scheduler.download_resource_body(resource_id, host, Priority::Interactive);
        while !task.is_complete() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    /// Like [`AppState::download_and_wait_for_body`], but also kicks
    /// off embedded-subresource discovery (SPEC_FULL.md §4.7 step 2's
    /// `DownloadResourceTask`, used when a URL is synthesized from a
    /// `ResourceGroup` match rather than an existing resource).
    pub async fn download_resource_and_wait_for_body(&self, resource_id: i64, host: Option<String>) {
        let task = self.scheduler.download_resource(resource_id, host, Priority::Interactive);
        while !task.is_complete() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }
}

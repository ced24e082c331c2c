//! What a single unit of work actually does (SPEC_FULL.md §4.6). Link
//! extraction is a pure, external collaborator per SPEC_FULL.md §1's
//! non-goals — it is injected as a trait rather than implemented here.

use std::sync::Arc;

use async_trait::async_trait;
use exn::ResultExt;

use crystal_model::alias::AliasedUrl;
use crystal_model::pattern::matches_pattern;
use crystal_model::Project;
use crystal_net::{Downloader, FetchOutcome};

use crate::error::{ErrorKind, Result};
use crate::task::{Priority, Task, TaskPayload};

/// `bytes -> (links)`, a pure function over a document body — the
/// HTML/XML/JSON extractors themselves are out of scope (SPEC_FULL.md
/// §1).
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, base_url: &str, content_type: Option<&str>, body: &[u8]) -> Vec<String>;
}

/// Extracts nothing; used where link discovery is not wired up yet.
pub struct NoLinks;

impl LinkExtractor for NoLinks {
    fn extract(&self, _base_url: &str, _content_type: Option<&str>, _body: &[u8]) -> Vec<String> {
        Vec::new()
    }
}

/// Executes exactly one [`TaskPayload`]'s unit of work. Receives the
/// live [`Task`] itself, not just its payload, so a unit that
/// decomposes into further work (a download that discovers links, a
/// group that enumerates members) can append children directly
/// (SPEC_FULL.md §4.6: "a list of children, appended by the task
/// itself as it decomposes its work").
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, payload: &TaskPayload) -> Result<()>;
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

/// The real executor: downloads bodies via `crystal-net` and persists
/// them via `crystal-model`.
pub struct DefaultExecutor {
    project: Arc<Project>,
    downloader: Arc<Downloader>,
    link_extractor: Arc<dyn LinkExtractor>,
}

impl DefaultExecutor {
    pub fn new(project: Arc<Project>, downloader: Arc<Downloader>, link_extractor: Arc<dyn LinkExtractor>) -> Self {
        Self { project, downloader, link_extractor }
    }

    /// Downloads and persists `resource_id`'s body. Returns the new
    /// revision's id, or `None` if the fetch itself failed (in which
    /// case there is nothing to parse links from).
    async fn download_resource_body(&self, resource_id: i64) -> Result<Option<i64>> {
        let repo = self.project.repository();
        let resource = repo.get_resource(resource_id).await.or_raise(|| ErrorKind::Model)?;

        match self.downloader.fetch(&resource.url, None).await {
            FetchOutcome::Body { metadata, body } => {
                let revision_id = self
                    .project
                    .create_revision_with_body(resource_id, None, &metadata, body)
                    .await
                    .or_raise(|| ErrorKind::Model)?;
                Ok(Some(revision_id))
            }
            FetchOutcome::Failed(error) => {
                self.project
                    .create_revision_with_error(resource_id, None, &error)
                    .await
                    .or_raise(|| ErrorKind::Model)?;
                Ok(None)
            }
        }
    }

    /// Extracts links from a just-downloaded revision, resolves each
    /// one (normalizing and applying aliases — SPEC_FULL.md §4.3), and
    /// schedules a `DownloadResourceBody` child for every internal
    /// link whose resource didn't already exist. Externally-aliased
    /// links are never scheduled or persisted as a resource.
    async fn parse_links(&self, task: &Task, resource_id: i64, revision_id: i64) -> Result<()> {
        let repo = self.project.repository();
        let revision = repo.get_revision(revision_id).await.or_raise(|| ErrorKind::Model)?;
        if revision.is_error() {
            return Ok(());
        }
        let resource = repo.get_resource(resource_id).await.or_raise(|| ErrorKind::Model)?;
        let metadata = revision.parsed_metadata().or_raise(|| ErrorKind::Model)?;
        let content_type = metadata
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str());

        let body = match self.project.store().read(revision_id as u64).await {
            Ok(body) => body,
            Err(_) => return Ok(()),
        };

        for link in self.link_extractor.extract(&resource.url, content_type, &body) {
            let resolved = self.project.resolve_link(&link).await.or_raise(|| ErrorKind::Model)?;
            let AliasedUrl::Internal(url) = resolved else {
                continue;
            };
            let child_resource = self.project.get_or_create_resource(&url).await.or_raise(|| ErrorKind::Model)?;
            let child = Task::new(
                TaskPayload::DownloadResourceBody { resource_id: child_resource.id, host: host_of(&url) },
                Priority::Background,
            );
            task.add_child(child);
        }
        Ok(())
    }

    /// Enumerates a group's current members against every known
    /// resource and schedules a download for each one not excluded by
    /// `do_not_download`.
    ///
    /// Simplification: SPEC_FULL.md §3 defines membership as resources
    /// matching the pattern *and* linked from the group's source; this
    /// implementation has no link-graph to consult (link discovery
    /// only records the resources it finds, not the edges between
    /// them — see DESIGN.md), so it matches the pattern against every
    /// known resource regardless of source.
    async fn update_group_members(&self, task: &Task, group_id: i64) -> Result<()> {
        let repo = self.project.repository();
        let group = repo.get_group(group_id).await.or_raise(|| ErrorKind::Model)?;
        let resources = repo.list_all_resources().await.or_raise(|| ErrorKind::Model)?;

        let mut last_member = None;
        for resource in resources {
            if !matches_pattern(&resource.url, &group.url_pattern) {
                continue;
            }
            last_member = Some(resource.id);
            if !group.do_not_download {
                let child = Task::new(
                    TaskPayload::DownloadResourceBody { resource_id: resource.id, host: host_of(&resource.url) },
                    task.priority(),
                );
                task.add_child(child);
            }
        }

        if let Some(last_member) = last_member {
            repo.update_group_last_downloaded_member(group_id, last_member).await.or_raise(|| ErrorKind::Model)?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for DefaultExecutor {
    async fn execute(&self, task: &Task, payload: &TaskPayload) -> Result<()> {
        match payload {
            TaskPayload::DownloadResourceBody { resource_id, .. } => {
                self.download_resource_body(*resource_id).await?;
                Ok(())
            }
            TaskPayload::DownloadResource { resource_id, .. } => {
                if let Some(revision_id) = self.download_resource_body(*resource_id).await? {
                    let child = Task::new(
                        TaskPayload::ParseLinks { resource_id: *resource_id, revision_id },
                        task.priority(),
                    );
                    task.add_child(child);
                }
                Ok(())
            }
            TaskPayload::ParseLinks { resource_id, revision_id } => {
                self.parse_links(task, *resource_id, *revision_id).await
            }
            TaskPayload::DownloadResourceGroupMembers { group_id }
            | TaskPayload::DownloadResourceGroup { group_id }
            | TaskPayload::UpdateResourceGroupMembers { group_id } => {
                self.update_group_members(task, *group_id).await
            }
            TaskPayload::Root => Ok(()),
        }
    }
}

//! The mutating JSON APIs behind the "Not In Archive" page (SPEC_FULL.md
//! §4.7): `download-url`, `create-group`, `create-alias`,
//! `preview-urls`. All but `preview-urls` refuse with 403 on a readonly
//! project.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crystal_scheduler::task::{Priority, TaskPayload};

use crate::error::HttpError;
use crate::state::AppState;

fn require_writable(state: &AppState) -> Result<(), HttpError> {
    if state.project.is_readonly() {
        return Err(HttpError::readonly());
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct DownloadUrlRequest {
    url: String,
    #[serde(default)]
    as_root: bool,
}

#[derive(Serialize)]
pub struct DownloadUrlResponse {
    resource_id: i64,
    task_id: u64,
}

pub async fn download_url(
    State(state): State<AppState>,
    Json(request): Json<DownloadUrlRequest>,
) -> Result<Response, HttpError> {
    require_writable(&state)?;

    let resource = state.project.get_or_create_resource(&request.url).await.map_err(HttpError::internal)?;
    if request.as_root {
        let repo = state.project.repository();
        repo.insert_root_resource(&request.url, resource.id).await.map_err(HttpError::internal)?;
    }

    let host = url::Url::parse(&request.url).ok().and_then(|u| u.host_str().map(str::to_string));
    let task = state.scheduler.download_resource_body(resource.id, host, Priority::Interactive);
    Ok(Json(DownloadUrlResponse { resource_id: resource.id, task_id: task.id }).into_response())
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    name: String,
    url_pattern: String,
    #[serde(default)]
    do_not_download: bool,
}

#[derive(Serialize)]
pub struct CreateGroupResponse {
    group_id: i64,
    task_id: Option<u64>,
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<Response, HttpError> {
    require_writable(&state)?;

    let repo = state.project.repository();
    let group_id = repo
        .insert_group(&request.name, &request.url_pattern, None, request.do_not_download)
        .await
        .map_err(HttpError::internal)?;

    let task_id = if request.do_not_download {
        None
    } else {
        let task = state.scheduler.submit(TaskPayload::UpdateResourceGroupMembers { group_id }, Priority::Normal);
        Some(task.id)
    };
    Ok(Json(CreateGroupResponse { group_id, task_id }).into_response())
}

#[derive(Deserialize)]
pub struct PreviewUrlsRequest {
    url_pattern: String,
}

#[derive(Serialize)]
pub struct PreviewUrlsResponse {
    urls: Vec<String>,
}

/// Previews which already-known resources a group's URL pattern would
/// include. Resources not yet discovered (no link to them has been
/// followed) cannot appear here; this is a preview of the archive's
/// current state, not a live crawl.
pub async fn preview_urls(
    State(state): State<AppState>,
    Json(request): Json<PreviewUrlsRequest>,
) -> Result<Response, HttpError> {
    let repo = state.project.repository();
    let resources = repo.list_all_resources().await.map_err(HttpError::internal)?;
    let urls = resources
        .into_iter()
        .filter(|r| crystal_model::pattern::matches_pattern(&r.url, &request.url_pattern))
        .map(|r| r.url)
        .collect();
    Ok(Json(PreviewUrlsResponse { urls }).into_response())
}

#[derive(Deserialize)]
pub struct CreateAliasRequest {
    source_url_prefix: String,
    target_url_prefix: String,
    #[serde(default)]
    target_is_external: bool,
}

#[derive(Serialize)]
pub struct CreateAliasResponse {
    alias_id: i64,
}

pub async fn create_alias(
    State(state): State<AppState>,
    Json(request): Json<CreateAliasRequest>,
) -> Result<Response, HttpError> {
    require_writable(&state)?;

    let repo = state.project.repository();
    let alias_id = repo
        .insert_alias(&request.source_url_prefix, &request.target_url_prefix, request.target_is_external)
        .await
        .map_err(HttpError::internal)?;
    Ok(Json(CreateAliasResponse { alias_id }).into_response())
}

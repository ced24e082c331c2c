//! Serving an archive URL (SPEC_FULL.md §4.7, steps 1-7).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};

use crystal_db::models::RevisionRow;
use crystal_model::alias::AliasedUrl;
use crystal_model::pattern::matches_pattern;

use crate::archive_url::{archive_url_from_request, request_path_for_archive};
use crate::error::HttpError;
use crate::headers::filter_archived_headers;
use crate::link_rewrite::rewrite_html;
use crate::state::AppState;

fn rfc2822_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc2822)
        .unwrap_or_default()
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
}

pub async fn serve(
    State(state): State<AppState>,
    Path((scheme, rest)): Path<(String, String)>,
    uri: Uri,
    request_headers: HeaderMap,
) -> Result<Response, HttpError> {
    let archive_url = archive_url_from_request(&scheme, &rest, uri.query());
    serve_archive_url(&state, &archive_url, &request_headers).await
}

pub async fn serve_archive_url(
    state: &AppState,
    archive_url: &str,
    request_headers: &HeaderMap,
) -> Result<Response, HttpError> {
    let resource = match resolve_or_synthesize_from_group(state, archive_url).await? {
        Some(resource) => resource,
        None => return not_in_archive(state, archive_url).await,
    };

    let revision = match state.project.default_revision(resource.id).await.map_err(HttpError::internal)? {
        Some(revision) => revision,
        None if !state.project.is_readonly() => {
            state.download_and_wait_for_body(resource.id, resource_host(&resource.url)).await;
            match state.project.default_revision(resource.id).await.map_err(HttpError::internal)? {
                Some(revision) => revision,
                None => return Err(HttpError::not_archived()),
            }
        }
        None => return Err(HttpError::not_archived()),
    };

    let etag = format!("\"{}\"", revision.id);
    if request_headers.get(axum::http::header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) == Some(etag.as_str()) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    if revision.is_error() {
        return Err(HttpError::not_archived());
    }

    render_revision(state, &resource.url, &revision, &etag).await
}

/// Step 2 of "Serving an archive URL" (SPEC_FULL.md §4.7): an existing
/// resource wins outright; otherwise, on a writable project, a
/// `ResourceGroup` match synthesizes one and starts a `DownloadResource`
/// task at interactive priority, blocking until its top-level body
/// completes.
async fn resolve_or_synthesize_from_group(
    state: &AppState,
    archive_url: &str,
) -> Result<Option<std::sync::Arc<crystal_db::models::ResourceRow>>, HttpError> {
    if let Some(resource) = state.project.resolve_resource(archive_url).await.map_err(HttpError::internal)? {
        return Ok(Some(resource));
    }
    if state.project.is_readonly() {
        return Ok(None);
    }

    let groups = state.project.repository().list_groups().await.map_err(HttpError::internal)?;
    let matched = groups.iter().any(|group| !group.do_not_download && matches_pattern(archive_url, &group.url_pattern));
    if !matched {
        return Ok(None);
    }

    let resource = state.project.get_or_create_resource(archive_url).await.map_err(HttpError::internal)?;
    state.download_resource_and_wait_for_body(resource.id, resource_host(&resource.url)).await;
    Ok(Some(resource))
}

fn resource_host(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

async fn render_revision(state: &AppState, base_url: &str, revision: &RevisionRow, etag: &str) -> Result<Response, HttpError> {
    let metadata = revision.parsed_metadata().map_err(HttpError::internal)?;
    let body = state.project.store().read(revision.id as u64).await.map_err(HttpError::internal)?;

    let content_type =
        metadata.headers.iter().find(|(name, _)| name.eq_ignore_ascii_case("content-type")).map(|(_, v)| v.clone());

    let status = StatusCode::from_u16(metadata.status_code.unwrap_or(200)).unwrap_or(StatusCode::OK);

    let aliases = state.project.repository().list_aliases().await.map_err(HttpError::internal)?;

    let body = if is_html(content_type.as_deref()) {
        let html = String::from_utf8_lossy(&body).into_owned();
        let rewritten = rewrite_html(&html, base_url, &aliases);
        inject_pin_date_and_banner(&rewritten, &metadata).into_bytes()
    } else {
        body
    };

    let mut response = Response::builder().status(status);
    for (name, value) in filter_archived_headers(&metadata.headers) {
        response = response.header(name, rewrite_if_location(name, value));
    }
    if !metadata.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("date")) {
        response = response.header("date", rfc2822_now());
    }
    let is_site_root = url::Url::parse(base_url).map(|u| u.path() == "/").unwrap_or(false);
    response = response.header("cache-control", if is_site_root { "max-age=0" } else { "max-age=3600" });
    response = response.header("etag", etag);

    response.body(axum::body::Body::from(body)).map_err(HttpError::internal)
}

fn rewrite_if_location(name: &str, value: &str) -> String {
    if !name.eq_ignore_ascii_case("location") {
        return value.to_string();
    }
    request_path_for_archive(value).unwrap_or_else(|_| value.to_string())
}

fn inject_pin_date_and_banner(html: &str, metadata: &crystal_db::models::RevisionMetadata) -> String {
    let date_header = metadata.headers.iter().find(|(name, _)| name.eq_ignore_ascii_case("date")).map(|(_, v)| v.clone());
    let timestamp_millis = date_header
        .and_then(|d| time::OffsetDateTime::parse(&d, &time::format_description::well_known::Rfc2822).ok())
        .map(|t| t.unix_timestamp() * 1000)
        .unwrap_or(0);

    let pin_script = format!("<script>{}</script>", crate::handlers::assets::pin_date_js(timestamp_millis));
    let footer = "<a id=\"cr-footer-banner\" href=\"https://dafoster.net/projects/crystal-web-archiver/\" target=\"_blank\">\
        <img src=\"/_/crystal/resources/appicon.svg\" width=\"24\" height=\"24\" onerror=\"this.style.display='none';\">\
        <span>This page was archived with Crystal</span></a>";

    let mut out = html.to_string();
    if let Some(pos) = out.to_ascii_lowercase().find("<head>") {
        out.insert_str(pos + "<head>".len(), &pin_script);
    } else {
        out = format!("{pin_script}{out}");
    }
    if let Some(pos) = out.to_ascii_lowercase().rfind("</body>") {
        out.insert_str(pos, footer);
    } else {
        out.push_str(footer);
    }
    out
}

async fn not_in_archive(state: &AppState, archive_url: &str) -> Result<Response, HttpError> {
    let aliases = state.project.repository().list_aliases().await.map_err(HttpError::internal)?;
    if let AliasedUrl::External(target) = crystal_model::alias::apply_alias(archive_url, &aliases) {
        return Ok((StatusCode::TEMPORARY_REDIRECT, [("location", target)]).into_response());
    }

    let page = format!(
        r#"<!DOCTYPE html><html><head><meta charset="utf-8"><title>Not In Archive</title>
        <link rel="stylesheet" href="/_/crystal/resources/style.css"></head>
        <body>
        <h1>Not In Archive</h1>
        <p>{archive_url} has not been downloaded yet.</p>
        <div class="cr-actions">
        <button onclick="crDownload(false)">Download only</button>
        <button onclick="crDownload(true)">Create Root URL + Download</button>
        <button onclick="crCreateGroup()">Create Group + optionally Download</button>
        </div>
        <script>
        const archiveUrl = {archive_url:?};
        function crDownload(asRoot) {{
            fetch('/_/crystal/download-url', {{
                method: 'POST',
                headers: {{'content-type': 'application/json'}},
                body: JSON.stringify({{url: archiveUrl, as_root: asRoot}}),
            }}).then((r) => r.json()).then((data) => crPoll(data.task_id));
        }}
        function crCreateGroup() {{
            const name = window.prompt('Group name?');
            if (!name) return;
            const urlPattern = window.prompt('URL pattern (wildcards: # digits, @ letters, * one segment, ** any)?', archiveUrl);
            if (!urlPattern) return;
            const doNotDownload = !window.confirm('Download matching members now?');
            fetch('/_/crystal/create-group', {{
                method: 'POST',
                headers: {{'content-type': 'application/json'}},
                body: JSON.stringify({{name: name, url_pattern: urlPattern, do_not_download: doNotDownload}}),
            }}).then((r) => r.json()).then((data) => {{
                if (data.task_id) {{
                    crPoll(data.task_id);
                }} else {{
                    window.location.reload();
                }}
            }});
        }}
        function crPoll(taskId) {{
            const source = new EventSource('/_/crystal/download-progress?task_id=' + taskId);
            source.onmessage = (event) => {{
                const progress = JSON.parse(event.data);
                if (progress.completed) {{
                    source.close();
                    window.location.reload();
                }}
            }};
        }}
        </script>
        </body></html>"#
    );
    Ok((StatusCode::NOT_FOUND, Html(page)).into_response())
}

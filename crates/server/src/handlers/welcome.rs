//! Fallback routing for anything outside `/_/...` (SPEC_FULL.md §4.7):
//! the referrer-based rescue redirect, and the welcome/404 pages.

use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::archive_url::{archive_url_from_request, request_path_for_archive};
use crate::state::AppState;

/// If the request carries a `Referer` pointing at an archive URL on
/// this server and the request path itself is not already under
/// `/_/`, the browser followed an absolute-path link that was never
/// rewritten at archive time. Resolve it against the referrer's
/// archive URL and send the browser to the correct `/_/` form.
fn rescue_redirect(path_and_query: &str, headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let referer_uri: url::Url = url::Url::parse(referer).ok()?;
    let mut segments = referer_uri.path_segments()?;
    if segments.next()? != "_" {
        return None;
    }
    let scheme = segments.next()?;
    let rest: String = segments.collect::<Vec<_>>().join("/");
    let referer_archive_url = archive_url_from_request(scheme, &rest, referer_uri.query());

    let base = url::Url::parse(&referer_archive_url).ok()?;
    let resolved = base.join(path_and_query).ok()?;
    request_path_for_archive(resolved.as_str()).ok()
}

pub async fn fallback(State(_state): State<AppState>, OriginalUri(uri): OriginalUri, headers: HeaderMap) -> Response {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    if let Some(redirect_to) = rescue_redirect(path_and_query, &headers) {
        return (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, redirect_to)]).into_response();
    }

    let body = format!(
        r#"<!DOCTYPE html><html><head><meta charset="utf-8"><title>Crystal</title>
        <link rel="stylesheet" href="/_/crystal/resources/style.css"></head>
        <body>
        <h1>Crystal</h1>
        <p>This server replays archived websites. Requests that name an archived
        page look like <code>/_/https/example.com/</code>.</p>
        <p>Nothing is archived at <code>{}</code>.</p>
        </body></html>"#,
        uri.path()
    );
    (StatusCode::NOT_FOUND, Html(body)).into_response()
}

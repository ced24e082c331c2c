//! `/_/crystal/resources/<name>` and `/_/crystal/pin_date.js` (SPEC_FULL.md
//! §4.7). A small fixed allowlist, never a directory listing or a path
//! resolved against the filesystem.

use axum::extract::{Path, Query};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

const STYLE_CSS: &str = include_str!("../../assets/style.css");
const APPICON_SVG: &str = include_str!("../../assets/appicon.svg");

pub async fn resource(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "style.css" => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLE_CSS).into_response(),
        "appicon.png" | "appicon.svg" => ([(header::CONTENT_TYPE, "image/svg+xml")], APPICON_SVG).into_response(),
        _ => (axum::http::StatusCode::NOT_FOUND, "unknown static resource").into_response(),
    }
}

/// Generates a script that replaces `window.Date` so that `new Date()`
/// resolves to the archived page's load time, matching what the
/// unpatched page would have seen when it was first captured.
pub fn pin_date_js(timestamp_millis: i64) -> String {
    format!(
        "window.Date = (function() {{\n\
         \tconst RealDate = window.Date;\n\
         \tfunction PageLoadDate() {{\n\
         \t\tif (this === window) {{ return (new PageLoadDate()).toString(); }}\n\
         \t\treturn new RealDate({timestamp_millis});\n\
         \t}}\n\
         \tPageLoadDate.now = function() {{ return (new PageLoadDate()).getTime(); }};\n\
         \tPageLoadDate.UTC = RealDate.UTC;\n\
         \treturn PageLoadDate;\n\
         }})();\n"
    )
}

pub async fn pin_date(Query(params): Query<HashMap<String, String>>) -> Response {
    let timestamp: i64 = params.get("t").and_then(|v| v.parse().ok()).unwrap_or(0);
    ([(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], pin_date_js(timestamp)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_date_js_embeds_the_given_timestamp() {
        let js = pin_date_js(12345);
        assert!(js.contains("new RealDate(12345)"));
    }
}

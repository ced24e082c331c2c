//! Archive URL ↔ request URL mapping (SPEC_FULL.md §4.7, §6, GLOSSARY).
//!
//! Archive URL: the original URL a resource represents, e.g.
//! `https://xkcd.com/1/`. Request URL: the local URL it is served
//! through, e.g. `http://127.0.0.1:2797/_/https/xkcd.com/1/`.

use exn::ResultExt;

use crate::error::{ErrorKind, Result};

/// `<scheme>/<authority>/<path>?<query>` — the part of a request path
/// after the `/_/` prefix, split back out of an archive URL.
pub fn request_path_for_archive(archive_url: &str) -> Result<String> {
    let url = url::Url::parse(archive_url).or_raise(|| ErrorKind::MalformedArchiveUrl)?;
    let scheme = url.scheme();
    let authority = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_string(),
    };
    let mut out = format!("/_/{scheme}/{authority}{}", url.path());
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    Ok(out)
}

/// The inverse of [`request_path_for_archive`]'s split: given the
/// `<scheme>` and `<rest>` captured from `/_/<scheme>/<rest>`, plus an
/// optional query string, reconstructs the archive URL.
pub fn archive_url_from_request(scheme: &str, rest: &str, query: Option<&str>) -> String {
    let mut out = format!("{scheme}://{rest}");
    if let Some(query) = query {
        if !query.is_empty() {
            out.push('?');
            out.push_str(query);
        }
    }
    out
}

/// The fully-qualified request URL a browser should use to re-request
/// `archive_url` through this server.
pub fn request_url_for_archive(archive_url: &str, bind: &str) -> Result<String> {
    Ok(format!("http://{bind}{}", request_path_for_archive(archive_url)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_a_simple_https_url_to_its_request_path() {
        assert_eq!(request_path_for_archive("https://xkcd.com/1/").unwrap(), "/_/https/xkcd.com/1/");
    }

    #[test]
    fn preserves_a_non_default_port() {
        assert_eq!(request_path_for_archive("http://example.test:8080/a").unwrap(), "/_/http/example.test:8080/a");
    }

    #[test]
    fn preserves_a_query_string() {
        assert_eq!(request_path_for_archive("https://example.test/a?x=1").unwrap(), "/_/https/example.test/a?x=1");
    }

    #[test]
    fn archive_url_from_request_is_the_inverse_split() {
        assert_eq!(archive_url_from_request("https", "xkcd.com/1/", None), "https://xkcd.com/1/");
        assert_eq!(archive_url_from_request("https", "example.test/a", Some("x=1")), "https://example.test/a?x=1");
    }

    #[test]
    fn request_url_prefixes_the_bind_address() {
        assert_eq!(
            request_url_for_archive("https://xkcd.com/1/", "127.0.0.1:2797").unwrap(),
            "http://127.0.0.1:2797/_/https/xkcd.com/1/"
        );
    }
}

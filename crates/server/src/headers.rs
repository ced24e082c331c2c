//! Header allow/deny-list policy for replayed responses (SPEC_FULL.md
//! §4.7): hop-by-hop headers, cookies, cache directives, alternate-
//! protocol advertisements, logging and rate-limit headers never leave
//! the archive; everything else is replayed verbatim.

/// Headers dropped unconditionally when replaying an archived
/// response. Lowercase, matched case-insensitively.
const DENYLIST: &[&str] = &[
    // Hop-by-hop (RFC 7230 §6.1).
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    // Cookies: replay never re-sets or forwards session state.
    "set-cookie",
    "set-cookie2",
    "cookie",
    // Cache-control: the server imposes its own replay cache policy.
    "cache-control",
    "pragma",
    "expires",
    "etag",
    // Alternate-protocol advertisements, meaningless for a local replica.
    "alt-svc",
    "alt-protocol",
    "strict-transport-security",
    // Origin-side logging/rate-limit bookkeeping.
    "server-timing",
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
    "report-to",
    "nel",
];

pub fn is_allowed(header_name: &str) -> bool {
    let lower = header_name.to_ascii_lowercase();
    !DENYLIST.contains(&lower.as_str())
}

pub fn filter_archived_headers(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers.iter().filter(|(name, _)| is_allowed(name)).map(|(name, value)| (name.as_str(), value.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_is_denied() {
        assert!(!is_allowed("Set-Cookie"));
    }

    #[test]
    fn content_type_is_allowed() {
        assert!(is_allowed("Content-Type"));
    }

    #[test]
    fn filtering_drops_only_denylisted_headers() {
        let headers = vec![
            ("Content-Type".to_string(), "text/html".to_string()),
            ("Set-Cookie".to_string(), "a=b".to_string()),
            ("Connection".to_string(), "keep-alive".to_string()),
        ];
        let filtered = filter_archived_headers(&headers);
        assert_eq!(filtered, vec![("Content-Type", "text/html")]);
    }
}

//! URL normalization and the `resource_url_alternatives` lookup chain
//! (SPEC_FULL.md §4.3).

use exn::ResultExt;
use url::Url;

use crate::error::{ErrorKind, Result};

/// Normalizes a URL to its canonical form: strip the fragment,
/// lowercase the host, percent-encode reserved/non-ASCII bytes (via
/// `url::Url`'s own parser, which does this as it parses), and replace
/// an empty path with `/`.
pub fn normalize(raw: &str) -> Result<String> {
    let mut parsed = Url::parse(raw).or_raise(|| ErrorKind::UrlNormalization(raw.to_string()))?;
    parsed.set_fragment(None);
    if let Some(host) = parsed.host_str() {
        let lowered = host.to_ascii_lowercase();
        parsed
            .set_host(Some(&lowered))
            .or_raise(|| ErrorKind::UrlNormalization(raw.to_string()))?;
    }
    if parsed.path().is_empty() {
        parsed.set_path("/");
    }
    Ok(parsed.to_string())
}

/// Returns the list of URL forms to try, in lookup order: the original
/// string as given, then any legacy normalizations kept for backward
/// compatibility with older archives, then the current canonical form
/// last. Every element is distinct; when normalization is a no-op, the
/// list has exactly one element.
///
/// Only one legacy rule is known to have existed in practice: older
/// versions of this format did not lowercase the host. That
/// intermediate form is included whenever it differs from both the
/// original and the canonical form.
pub fn resource_url_alternatives(raw: &str) -> Result<Vec<String>> {
    let canonical = normalize(raw)?;
    let mut alternatives = vec![raw.to_string()];

    let unlowered_host = Url::parse(raw)
        .ok()
        .map(|mut u| {
            u.set_fragment(None);
            if u.path().is_empty() {
                u.set_path("/");
            }
            u.to_string()
        })
        .filter(|candidate| *candidate != raw && *candidate != canonical);
    if let Some(candidate) = unlowered_host {
        alternatives.push(candidate);
    }

    if canonical != raw {
        alternatives.push(canonical);
    }
    alternatives.dedup();
    Ok(alternatives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_and_strips_fragment() {
        let canonical = normalize("HTTP://Example.COM/a/b#section").unwrap();
        assert_eq!(canonical, "http://example.com/a/b");
    }

    #[test]
    fn empty_path_becomes_slash() {
        let canonical = normalize("http://example.com").unwrap();
        assert_eq!(canonical, "http://example.com/");
    }

    #[test]
    fn already_canonical_url_is_unchanged() {
        let canonical = normalize("http://example.com/a").unwrap();
        assert_eq!(canonical, "http://example.com/a");
    }

    #[test]
    fn alternatives_always_end_with_canonical_form() {
        let alts = resource_url_alternatives("HTTP://Example.com/x#y").unwrap();
        assert_eq!(alts.last().unwrap(), "http://example.com/x");
        assert_eq!(alts.first().unwrap(), "HTTP://Example.com/x#y");
    }

    #[test]
    fn alternatives_has_one_entry_when_already_canonical() {
        let alts = resource_url_alternatives("http://example.com/x").unwrap();
        assert_eq!(alts, vec!["http://example.com/x".to_string()]);
    }
}

//! Alias rewriting, applied after URL normalization (SPEC_FULL.md §4.3,
//! §9 Decision).

use crystal_db::models::AliasRow;

/// The result of applying the configured aliases to a normalized URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasedUrl {
    /// No alias matched, or the matched alias targets another location
    /// inside this archive: `url` is what should be resourced/fetched.
    Internal(String),
    /// The matched alias targets outside this archive: `url` must
    /// never be scheduled for download and is not persisted as a
    /// `resource` row. Requests against the *source* prefix redirect
    /// here instead.
    External(String),
}

/// Rewrites `canonical_url` using the first alias (by longest
/// `source_url_prefix`, see [`crystal_db::Repository::list_aliases`])
/// whose prefix it starts with. Aliases are assumed already sorted
/// longest-prefix-first.
pub fn apply_alias(canonical_url: &str, aliases: &[AliasRow]) -> AliasedUrl {
    for alias in aliases {
        if let Some(rest) = canonical_url.strip_prefix(alias.source_url_prefix.as_str()) {
            let rewritten = format!("{}{}", alias.target_url_prefix, rest);
            return if alias.target_is_external {
                AliasedUrl::External(rewritten)
            } else {
                AliasedUrl::Internal(rewritten)
            };
        }
    }
    AliasedUrl::Internal(canonical_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(source: &str, target: &str, external: bool) -> AliasRow {
        AliasRow {
            id: 0,
            source_url_prefix: source.to_string(),
            target_url_prefix: target.to_string(),
            target_is_external: external,
        }
    }

    #[test]
    fn no_match_passes_url_through_unchanged() {
        let result = apply_alias("http://example.com/a", &[alias("http://other.com/", "http://x/", false)]);
        assert_eq!(result, AliasedUrl::Internal("http://example.com/a".to_string()));
    }

    #[test]
    fn internal_alias_rewrites_prefix() {
        let aliases = [alias("http://example.com/old/", "http://example.com/new/", false)];
        let result = apply_alias("http://example.com/old/page", &aliases);
        assert_eq!(result, AliasedUrl::Internal("http://example.com/new/page".to_string()));
    }

    #[test]
    fn external_alias_is_tagged_and_excluded_from_download() {
        let aliases = [alias("http://mirror.example.com/", "https://upstream.example.com/", true)];
        let result = apply_alias("http://mirror.example.com/doc", &aliases);
        assert_eq!(result, AliasedUrl::External("https://upstream.example.com/doc".to_string()));
    }

    #[test]
    fn longest_prefix_wins_when_list_is_pre_sorted() {
        let aliases = [
            alias("http://example.com/a/b/", "http://specific/", false),
            alias("http://example.com/a/", "http://general/", false),
        ];
        let result = apply_alias("http://example.com/a/b/c", &aliases);
        assert_eq!(result, AliasedUrl::Internal("http://specific/c".to_string()));
    }
}

//! `ResourceGroup` URL pattern matching (SPEC_FULL.md §3): `#` matches
//! one or more digits, `@` one or more letters, `*` a non-slash run,
//! `**` any run including `/`. Everything else is a literal.
//!
//! SQL `LIKE` can express none of this (its only wildcard, `%`, also
//! crosses `/` the way `*` must not), so patterns are compiled to a
//! `regex::Regex` instead and matched against already-known resource
//! URLs in process.

use regex::Regex;

/// Compiles a group's wildcard pattern to an anchored regex.
pub fn pattern_to_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    let mut literal = String::new();
    let flush_literal = |literal: &mut String, out: &mut String| {
        if !literal.is_empty() {
            out.push_str(&regex::escape(literal));
            literal.clear();
        }
    };

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                flush_literal(&mut literal, &mut out);
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                flush_literal(&mut literal, &mut out);
                out.push_str("[^/]*");
                i += 1;
            }
            '#' => {
                flush_literal(&mut literal, &mut out);
                out.push_str("[0-9]+");
                i += 1;
            }
            '@' => {
                flush_literal(&mut literal, &mut out);
                out.push_str("[A-Za-z]+");
                i += 1;
            }
            ch => {
                literal.push(ch);
                i += 1;
            }
        }
    }
    flush_literal(&mut literal, &mut out);
    out.push('$');

    Regex::new(&out).expect("pattern compiles to a regex built from escaped literals and fixed tokens")
}

/// Whether `url` is a member of the group identified by `pattern`.
pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    pattern_to_regex(pattern).is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_does_not_cross_a_slash() {
        assert!(matches_pattern("http://example.test/a/b", "http://example.test/*/b"));
        assert!(!matches_pattern("http://example.test/a/x/b", "http://example.test/*/b"));
    }

    #[test]
    fn double_star_crosses_slashes() {
        assert!(matches_pattern("http://example.test/a/x/b", "http://example.test/**/b"));
    }

    #[test]
    fn hash_matches_one_or_more_digits_only() {
        assert!(matches_pattern("http://example.test/comic/42", "http://example.test/comic/#"));
        assert!(!matches_pattern("http://example.test/comic/abc", "http://example.test/comic/#"));
        assert!(!matches_pattern("http://example.test/comic/", "http://example.test/comic/#"));
    }

    #[test]
    fn at_matches_one_or_more_letters_only() {
        assert!(matches_pattern("http://example.test/tag/news", "http://example.test/tag/@"));
        assert!(!matches_pattern("http://example.test/tag/42", "http://example.test/tag/@"));
    }

    #[test]
    fn literal_regex_metacharacters_are_escaped() {
        assert!(matches_pattern("http://example.test/100%done", "http://example.test/100%done"));
        assert!(!matches_pattern("http://example.test/100Xdone", "http://example.test/100%done"));
    }

    #[test]
    fn pattern_without_wildcards_matches_only_exactly() {
        assert!(matches_pattern("http://example.test/x", "http://example.test/x"));
        assert!(!matches_pattern("http://example.test/xy", "http://example.test/x"));
    }
}

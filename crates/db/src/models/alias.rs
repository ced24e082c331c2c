//! Row for `alias`.

use sqlx::FromRow;

/// Redirects a URL prefix to another prefix, applied after normalization
/// and before indexing (SPEC_FULL.md §4.3, §9 Decision).
#[derive(Debug, Clone, FromRow)]
pub struct AliasRow {
    pub id: i64,
    pub source_url_prefix: String,
    pub target_url_prefix: String,
    pub target_is_external: bool,
}

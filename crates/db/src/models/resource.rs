//! Rows for `resource`, `root_resource` and `resource_group`.

use sqlx::FromRow;

/// A fetchable URL. The unit of both scheduling and storage: every
/// [`crate::models::RevisionRow`] belongs to exactly one resource.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    pub id: i64,
    pub url: String,
}

/// Names a resource as a project entry point (SPEC_FULL.md §3).
#[derive(Debug, Clone, FromRow)]
pub struct RootResourceRow {
    pub id: i64,
    pub name: String,
    pub resource_id: i64,
}

/// The two legal shapes of `resource_group.source_type`. Any other
/// stored string is a data-corruption bug rather than a case to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSourceType {
    RootResource,
    ResourceGroup,
}

impl GroupSourceType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::RootResource => "root_resource",
            Self::ResourceGroup => "resource_group",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "root_resource" => Some(Self::RootResource),
            "resource_group" => Some(Self::ResourceGroup),
            _ => None,
        }
    }
}

/// A pattern-matched collection of member resources, optionally sourced
/// from another root resource or group (SPEC_FULL.md §3).
#[derive(Debug, Clone, FromRow)]
pub struct ResourceGroupRow {
    pub id: i64,
    pub name: String,
    pub url_pattern: String,
    pub source_type: Option<String>,
    pub source_id: Option<i64>,
    pub do_not_download: bool,
    pub last_downloaded_member_id: Option<i64>,
}

impl ResourceGroupRow {
    pub fn source(&self) -> Option<(GroupSourceType, i64)> {
        let ty = GroupSourceType::from_db_str(self.source_type.as_deref()?)?;
        Some((ty, self.source_id?))
    }
}

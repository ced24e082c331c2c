//! Row for `project_property`, the flat name/value table used for
//! `major_version`, `major_version_old` and similar project metadata
//! (SPEC_FULL.md §3, §4.2).

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct PropertyRow {
    pub name: String,
    pub value: Option<String>,
}

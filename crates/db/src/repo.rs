//! Repository for resources, root resources, groups, aliases, revisions
//! and project properties (SPEC_FULL.md §3).
//!
//! Each entity gets its own small block of methods rather than one
//! combined upsert the way the teacher's file/version pair share one,
//! because resources, groups and revisions are independently created,
//! read and deleted by different callers (the downloader inserts
//! revisions, the scheduler inserts groups, migrations touch
//! properties) and don't share a write transaction in practice.

use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;

use crate::error::{ErrorKind, Result};
use crate::models::{
    encode_error, encode_metadata, AliasRow, GroupSourceType, PropertyRow, ResourceGroupRow,
    ResourceRow, RevisionError, RevisionMetadata, RevisionRow, RootResourceRow,
};
use crate::Database;

/// Repository for a project's SQLite database.
///
/// When `dry_run` is enabled, write methods still validate their
/// inputs but skip the mutation, mirroring a read-only project open
/// (SPEC_FULL.md §6 CLI `--readonly`).
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}

impl Repository {
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /* ========== *\
    |  Resources   |
    \* ========== */

    /// Inserts a new resource for `url`, returning its id. Callers
    /// should check [`Repository::get_resource_by_url`] first; `url`
    /// is unique so a duplicate insert fails with a database error.
    pub async fn insert_resource(&self, url: &str) -> Result<i64> {
        if self.dry_run {
            return Ok(0);
        }
        let id: i64 = sqlx::query_scalar(include_str!("../queries/insert_resource.sql"))
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(id)
    }

    pub async fn get_resource_by_url(&self, url: &str) -> Result<Option<ResourceRow>> {
        sqlx::query_as(include_str!("../queries/get_resource_by_url.sql"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn get_resource(&self, id: i64) -> Result<ResourceRow> {
        sqlx::query_as(include_str!("../queries/get_resource_by_id.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .or_raise(|| ErrorKind::ResourceNotFound(id))
    }

    /// Every known resource, ascending by id and capped at 5000 rows.
    /// `ResourceGroup` patterns use `#`/`@`/`*`/`**` wildcards SQL
    /// `LIKE` cannot express, so group-membership and preview queries
    /// scan this list and match in Rust instead of pushing the pattern
    /// into SQL.
    pub async fn list_all_resources(&self) -> Result<Vec<ResourceRow>> {
        sqlx::query_as(include_str!("../queries/list_all_resources.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Deletes a resource and, via `ON DELETE CASCADE`, every revision
    /// that belongs to it. Any group whose `last_downloaded_member_id`
    /// pointed at it is left with a dangling reference cleared by the
    /// `REFERENCES resource(id)` constraint only if the column itself
    /// cascades; here it does not, so callers that delete resources
    /// referenced by a group should update the group first.
    pub async fn delete_resource(&self, id: i64) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/delete_resource.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /* =============== *\
    |  Root resources    |
    \* =============== */

    pub async fn insert_root_resource(&self, name: &str, resource_id: i64) -> Result<i64> {
        if self.dry_run {
            return Ok(0);
        }
        match sqlx::query_scalar(include_str!("../queries/insert_root_resource.sql"))
            .bind(name)
            .bind(resource_id)
            .fetch_one(&self.pool)
            .await
        {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ErrorKind::DuplicateRootResourceName(name.to_string()).into())
            }
            Err(e) => Err(e).or_raise(|| ErrorKind::Database),
        }
    }

    pub async fn get_root_resource_by_name(&self, name: &str) -> Result<Option<RootResourceRow>> {
        sqlx::query_as(include_str!("../queries/get_root_resource_by_name.sql"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn delete_root_resource(&self, id: i64) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/delete_root_resource.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /* ================ *\
    |  Resource groups    |
    \* ================ */

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_group(
        &self,
        name: &str,
        url_pattern: &str,
        source: Option<(GroupSourceType, i64)>,
        do_not_download: bool,
    ) -> Result<i64> {
        if self.dry_run {
            return Ok(0);
        }
        let (source_type, source_id) = match source {
            Some((ty, id)) => (Some(ty.as_db_str()), Some(id)),
            None => (None, None),
        };
        sqlx::query_scalar(include_str!("../queries/insert_group.sql"))
            .bind(name)
            .bind(url_pattern)
            .bind(source_type)
            .bind(source_id)
            .bind(do_not_download)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn get_group(&self, id: i64) -> Result<ResourceGroupRow> {
        sqlx::query_as(include_str!("../queries/get_group_by_id.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .or_raise(|| ErrorKind::ResourceNotFound(id))
    }

    pub async fn list_groups(&self) -> Result<Vec<ResourceGroupRow>> {
        sqlx::query_as(include_str!("../queries/list_groups.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Clears `source_type`/`source_id` on every group that names
    /// `(source_type, source_id)` as its source, per SPEC_FULL.md §3:
    /// deleting a root resource or group leaves dependent groups
    /// sourceless rather than deleting them.
    pub async fn null_group_sources_referencing(
        &self,
        source: (GroupSourceType, i64),
    ) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/null_group_sources_referencing.sql"))
            .bind(source.0.as_db_str())
            .bind(source.1)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn delete_group(&self, id: i64) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        self.null_group_sources_referencing((GroupSourceType::ResourceGroup, id)).await?;
        sqlx::query(include_str!("../queries/delete_group.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn update_group_last_downloaded_member(
        &self,
        group_id: i64,
        member_resource_id: i64,
    ) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/update_group_last_downloaded_member.sql"))
            .bind(member_resource_id)
            .bind(group_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /* ======== *\
    |  Aliases   |
    \* ======== */

    pub async fn insert_alias(
        &self,
        source_url_prefix: &str,
        target_url_prefix: &str,
        target_is_external: bool,
    ) -> Result<i64> {
        if self.dry_run {
            return Ok(0);
        }
        match sqlx::query_scalar(include_str!("../queries/insert_alias.sql"))
            .bind(source_url_prefix)
            .bind(target_url_prefix)
            .bind(target_is_external)
            .fetch_one(&self.pool)
            .await
        {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ErrorKind::DuplicateAliasPrefix(source_url_prefix.to_string()).into())
            }
            Err(e) => Err(e).or_raise(|| ErrorKind::Database),
        }
    }

    /// Every configured alias, longest `source_url_prefix` first so
    /// callers can take the first match (SPEC_FULL.md §4.3).
    pub async fn list_aliases(&self) -> Result<Vec<AliasRow>> {
        let mut rows: Vec<AliasRow> = sqlx::query_as(include_str!("../queries/list_aliases.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.sort_by(|a, b| b.source_url_prefix.len().cmp(&a.source_url_prefix.len()));
        Ok(rows)
    }

    /* =========== *\
    |  Revisions    |
    \* =========== */

    /// Records a successful fetch: `error` is the literal `'null'`
    /// marker and `metadata` holds the response's HTTP metadata.
    pub async fn insert_revision_ok(
        &self,
        resource_id: i64,
        request_cookie: Option<&str>,
        metadata: &RevisionMetadata,
    ) -> Result<i64> {
        self.insert_revision_raw(resource_id, request_cookie, None, metadata).await
    }

    /// Records a fetch failure: no body exists for this revision.
    pub async fn insert_revision_error(
        &self,
        resource_id: i64,
        request_cookie: Option<&str>,
        error: &RevisionError,
    ) -> Result<i64> {
        self.insert_revision_raw(resource_id, request_cookie, Some(error), &RevisionMetadata::default())
            .await
    }

    async fn insert_revision_raw(
        &self,
        resource_id: i64,
        request_cookie: Option<&str>,
        error: Option<&RevisionError>,
        metadata: &RevisionMetadata,
    ) -> Result<i64> {
        if self.dry_run {
            return Ok(0);
        }
        let error_json = encode_error(error)?;
        let metadata_json = encode_metadata(metadata)?;
        sqlx::query_scalar(include_str!("../queries/insert_revision.sql"))
            .bind(resource_id)
            .bind(request_cookie)
            .bind(error_json)
            .bind(metadata_json)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn get_revision(&self, id: i64) -> Result<RevisionRow> {
        sqlx::query_as(include_str!("../queries/get_revision.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .or_raise(|| ErrorKind::RevisionNotFound(id))
    }

    /// Deletes a revision row. Used by orphan repair to remove the
    /// trailing revision whose body file cannot be found on disk
    /// (SPEC_FULL.md §4.8).
    pub async fn delete_revision(&self, id: i64) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/delete_revision.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn list_revisions_for_resource(&self, resource_id: i64) -> Result<Vec<RevisionRow>> {
        sqlx::query_as(include_str!("../queries/list_revisions_for_resource.sql"))
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Every revision id, ascending. Used by the v1→v2 migration,
    /// which must visit ids in order (SPEC_FULL.md §4.2).
    pub async fn list_all_revision_ids(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar(include_str!("../queries/list_all_revision_ids.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// The highest revision id in the project, or `None` for a fresh
    /// project with no revisions yet. Orphan repair starts from here
    /// (SPEC_FULL.md §4.8).
    pub async fn get_max_revision_id(&self) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar(include_str!("../queries/get_max_revision_id.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(max)
    }

    /// Up to `limit` revisions with ids below `before_id` that
    /// recorded no error, most recent first. Orphan repair calls this
    /// with `limit = 3` to check the prior revisions when the last
    /// one's body is missing (SPEC_FULL.md §4.8).
    pub async fn list_recent_non_error_revisions_before(
        &self,
        before_id: i64,
        limit: i64,
    ) -> Result<Vec<RevisionRow>> {
        sqlx::query_as(include_str!("../queries/list_recent_non_error_revisions_before.sql"))
            .bind(before_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /* ================= *\
    |  Project properties  |
    \* ================= */

    pub async fn get_property(&self, name: &str) -> Result<Option<String>> {
        let row: Option<PropertyRow> = sqlx::query_as(include_str!("../queries/get_property.sql"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.and_then(|r| r.value))
    }

    pub async fn set_property(&self, name: &str, value: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/set_property.sql"))
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn delete_property(&self, name: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/delete_property.sql"))
            .bind(name)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RevisionMetadata;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        // Leak the pool out of the short-lived Database so the in-memory
        // connection (single-connection pool) stays alive for the test.
        Repository::new(db.pool().clone(), false)
    }

    #[tokio::test]
    async fn resource_round_trip() {
        let repo = repo().await;
        let id = repo.insert_resource("https://example.com/").await.unwrap();
        let row = repo.get_resource_by_url("https://example.com/").await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.url, "https://example.com/");
    }

    #[tokio::test]
    async fn list_all_resources_is_ordered_by_id() {
        let repo = repo().await;
        let a = repo.insert_resource("https://example.com/a").await.unwrap();
        let b = repo.insert_resource("https://example.com/b").await.unwrap();
        let urls = repo.list_all_resources().await.unwrap();
        assert_eq!(urls.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[tokio::test]
    async fn root_resource_rejects_duplicate_name() {
        let repo = repo().await;
        let a = repo.insert_resource("https://example.com/a").await.unwrap();
        let b = repo.insert_resource("https://example.com/b").await.unwrap();
        repo.insert_root_resource("home", a).await.unwrap();
        let err = repo.insert_root_resource("home", b).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::DuplicateRootResourceName(_)));
    }

    #[tokio::test]
    async fn deleting_group_source_nulls_dependents() {
        let repo = repo().await;
        let source_group = repo.insert_group("source", "*", None, false).await.unwrap();
        let dependent = repo
            .insert_group("dep", "*", Some((GroupSourceType::ResourceGroup, source_group)), false)
            .await
            .unwrap();
        repo.delete_group(source_group).await.unwrap();
        let row = repo.get_group(dependent).await.unwrap();
        assert_eq!(row.source(), None);
    }

    #[tokio::test]
    async fn revision_error_round_trips_through_json() {
        let repo = repo().await;
        let resource_id = repo.insert_resource("https://example.com/").await.unwrap();
        let error = RevisionError { kind: "timeout".into(), message: "connect timed out".into() };
        let id = repo.insert_revision_error(resource_id, None, &error).await.unwrap();
        let row = repo.get_revision(id).await.unwrap();
        assert!(row.is_error());
        let parsed = row.parsed_error().unwrap().unwrap();
        assert_eq!(parsed.kind, "timeout");
    }

    #[tokio::test]
    async fn non_error_revision_has_null_sentinel() {
        let repo = repo().await;
        let resource_id = repo.insert_resource("https://example.com/").await.unwrap();
        let id = repo.insert_revision_ok(resource_id, None, &RevisionMetadata::default()).await.unwrap();
        let row = repo.get_revision(id).await.unwrap();
        assert!(!row.is_error());
        assert_eq!(row.error, "null");
    }

    #[tokio::test]
    async fn recent_non_error_revisions_excludes_errors_and_orders_descending() {
        let repo = repo().await;
        let resource_id = repo.insert_resource("https://example.com/").await.unwrap();
        let meta = RevisionMetadata::default();
        let ok1 = repo.insert_revision_ok(resource_id, None, &meta).await.unwrap();
        let _err = repo
            .insert_revision_error(
                resource_id,
                None,
                &RevisionError { kind: "io".into(), message: "oops".into() },
            )
            .await
            .unwrap();
        let ok2 = repo.insert_revision_ok(resource_id, None, &meta).await.unwrap();
        let last = repo.get_max_revision_id().await.unwrap().unwrap();
        let recent = repo.list_recent_non_error_revisions_before(last + 1, 3).await.unwrap();
        assert_eq!(recent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ok2, ok1]);
    }

    #[tokio::test]
    async fn properties_round_trip_and_overwrite() {
        let repo = repo().await;
        assert_eq!(repo.get_property("major_version").await.unwrap(), None);
        repo.set_property("major_version", "2").await.unwrap();
        assert_eq!(repo.get_property("major_version").await.unwrap(), Some("2".into()));
        repo.set_property("major_version", "3").await.unwrap();
        assert_eq!(repo.get_property("major_version").await.unwrap(), Some("3".into()));
        repo.delete_property("major_version").await.unwrap();
        assert_eq!(repo.get_property("major_version").await.unwrap(), None);
    }
}

//! Project lifecycle: open/create, in-place migration to the latest
//! major version, and orphan-revision repair (SPEC_FULL.md §3, §4.2,
//! §4.8). This is the one module that needs both `crystal-db` and
//! `crystal-store`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use exn::{OptionExt, ResultExt};
use tracing::instrument;

use crystal_db::models::{
    AliasRow, GroupSourceType, ResourceGroupRow, ResourceRow, RevisionError, RevisionMetadata,
    RevisionRow,
};
use crystal_db::{Database, Repository};
use crystal_store::{layout, migrate, repair, MajorVersion, RevisionStore};

use crate::alias::{apply_alias, AliasedUrl};
use crate::error::{ErrorKind, Result};
use crate::index::ResourceIndex;
use crate::observer::ObserverSet;
use crate::url::resource_url_alternatives;

const PROPERTY_MAJOR_VERSION: &str = "major_version";
const PROPERTY_MAJOR_VERSION_OLD: &str = "major_version_old";
const PROPERTY_HIBERNATE_SNAPSHOT: &str = "hibernate_snapshot";

/// How many prior non-error revisions orphan repair inspects before
/// concluding the last one is a genuine rollback failure rather than a
/// filesystem-wide problem (SPEC_FULL.md §4.8 step 4).
const ORPHAN_REPAIR_WITNESS_COUNT: i64 = 3;

/// A project: one SQLite database plus one revision store, open either
/// writable (migrations and orphan repair run automatically) or
/// read-only (the on-disk format is left exactly as found).
pub struct Project {
    root: PathBuf,
    db: Database,
    store: RevisionStore,
    resources: ResourceIndex,
    observers: ObserverSet,
    readonly: bool,
}

impl Project {
    /// Creates a fresh project at `root`, which must not already
    /// contain a database. Starts directly at the latest major
    /// version; there is nothing to migrate.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("revisions")).or_raise(|| ErrorKind::Store)?;
        std::fs::create_dir_all(root.join("tmp")).or_raise(|| ErrorKind::Store)?;
        std::fs::write(root.join("OPEN ME.crystalopen"), b"CrOp").or_raise(|| ErrorKind::Store)?;
        std::fs::write(
            root.join("README.txt"),
            "This directory is a Crystal archive project. Open it with the \
             crystal binary rather than editing its contents directly.\n",
        )
        .or_raise(|| ErrorKind::Store)?;

        let db = Database::connect(root.join("database.sqlite")).await.or_raise(|| ErrorKind::Database)?;
        let repo = Repository::from(&db);
        repo.set_property(PROPERTY_MAJOR_VERSION, "3").await.or_raise(|| ErrorKind::Database)?;

        Ok(Self {
            store: RevisionStore::new(&root, MajorVersion::Pack16),
            root,
            db,
            resources: ResourceIndex::new(),
            observers: ObserverSet::new(),
            readonly: false,
        })
    }

    /// Opens an existing project. When `readonly` is false, runs any
    /// pending migration to the latest major version and then probes
    /// for an orphaned trailing revision, before returning.
    #[instrument(skip_all, fields(root = %root.as_ref().display(), readonly))]
    pub async fn open(root: impl AsRef<Path>, readonly: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let db = Database::connect(root.join("database.sqlite")).await.or_raise(|| ErrorKind::Database)?;
        let repo = Repository::from(&db);

        let major_version = Self::read_major_version(&repo).await?;
        let mut project = Self {
            store: RevisionStore::new(&root, major_version),
            root,
            db,
            resources: ResourceIndex::new(),
            observers: ObserverSet::new(),
            readonly,
        };

        if !readonly {
            if let Err(err) = project.run_migrations().await {
                if matches!(&*err, ErrorKind::MigrationVetoed) {
                    tracing::warn!("migration vetoed, opening project read-only instead");
                    project.readonly = true;
                } else {
                    return Err(err);
                }
            } else {
                project.repair_orphan_revision().await?;
            }
        }
        Ok(project)
    }

    async fn read_major_version(repo: &Repository) -> Result<MajorVersion> {
        let raw = repo.get_property(PROPERTY_MAJOR_VERSION).await.or_raise(|| ErrorKind::Database)?;
        let value: i64 = raw.as_deref().unwrap_or("1").parse().or_raise(|| ErrorKind::ProjectFormat)?;
        MajorVersion::from_i64(value).ok_or_raise(|| ErrorKind::ProjectTooNew(value as u32))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn repository(&self) -> Repository {
        Repository::from(&self.db)
    }

    pub fn store(&self) -> &RevisionStore {
        &self.store
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }

    /// Advances the on-disk format from whatever version it was opened
    /// at up to [`MajorVersion::Pack16`], one step at a time, so a
    /// crash mid-flight always leaves a state the next open recognizes
    /// and resumes (SPEC_FULL.md §4.2).
    #[instrument(skip(self))]
    async fn run_migrations(&mut self) -> Result<()> {
        if self.readonly {
            return Ok(());
        }
        loop {
            match self.store.major_version() {
                MajorVersion::Flat => self.migrate_v1_to_v2().await?,
                MajorVersion::Hierarchical => self.migrate_v2_to_v3().await?,
                MajorVersion::Pack16 => break,
            }
        }
        Ok(())
    }

    async fn migrate_v1_to_v2(&mut self) -> Result<()> {
        let repo = self.repository();
        let ids = repo.list_all_revision_ids().await.or_raise(|| ErrorKind::Database)?;
        let max_id = ids.iter().copied().max();
        if let Some(max_id) = max_id {
            if max_id as u64 > layout::MAX_REVISION_ID {
                exn::bail!(ErrorKind::MigrationVetoed);
            }
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> crystal_store::error::Result<()> {
            migrate::migrate_v1_to_v2(&root, ids.into_iter().map(|id| id as u64), |_| {})?;
            if let Some(max_id) = max_id {
                migrate::flush_final_leaf(&root, max_id as u64)?;
            }
            Ok(())
        })
        .await
        .expect("v1->v2 migration task panicked")
        .or_raise(|| ErrorKind::Store)?;

        repo.set_property(PROPERTY_MAJOR_VERSION, "2").await.or_raise(|| ErrorKind::Database)?;

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || migrate::commit_migrate_v1_to_v2(&root))
            .await
            .expect("v1->v2 commit task panicked")
            .or_raise(|| ErrorKind::Store)?;

        self.store = RevisionStore::new(&self.root, MajorVersion::Hierarchical);
        Ok(())
    }

    async fn migrate_v2_to_v3(&mut self) -> Result<()> {
        let repo = self.repository();
        repo.set_property(PROPERTY_MAJOR_VERSION_OLD, "2").await.or_raise(|| ErrorKind::Database)?;
        repo.set_property(PROPERTY_MAJOR_VERSION, "3").await.or_raise(|| ErrorKind::Database)?;

        let max_id = repo.get_max_revision_id().await.or_raise(|| ErrorKind::Database)?.unwrap_or(-1);
        if max_id >= 0 {
            let root = self.root.clone();
            tokio::task::spawn_blocking(move || migrate::migrate_v2_to_v3(&root, max_id as u64, |_| {}))
                .await
                .expect("v2->v3 migration task panicked")
                .or_raise(|| ErrorKind::Store)?;
        }

        repo.delete_property(PROPERTY_MAJOR_VERSION_OLD).await.or_raise(|| ErrorKind::Database)?;
        self.store = RevisionStore::new(&self.root, MajorVersion::Pack16);
        Ok(())
    }

    /// Detects and repairs the "failed rollback" case described in
    /// SPEC_FULL.md §4.8: a trailing revision row whose body was never
    /// durably written because the process died between the DB commit
    /// and the filesystem rename.
    #[instrument(skip(self))]
    async fn repair_orphan_revision(&self) -> Result<()> {
        let repo = self.repository();
        let Some(last_id) = repo.get_max_revision_id().await.or_raise(|| ErrorKind::Database)? else {
            return Ok(());
        };
        let last = repo.get_revision(last_id).await.or_raise(|| ErrorKind::Database)?;
        if last.is_error() {
            return Ok(());
        }
        if self.store.exists(last_id as u64).await {
            return Ok(());
        }

        let witnesses = repo
            .list_recent_non_error_revisions_before(last_id, ORPHAN_REPAIR_WITNESS_COUNT)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if witnesses.len() < ORPHAN_REPAIR_WITNESS_COUNT as usize {
            return Ok(());
        }
        for witness in &witnesses {
            if !self.store.exists(witness.id as u64).await {
                return Ok(());
            }
        }

        repo.delete_revision(last_id).await.or_raise(|| ErrorKind::Database)?;
        // Specified as a literal line on stderr, not a structured
        // tracing event that an EnvFilter could silence (SPEC_FULL.md
        // §10.1).
        eprintln!("Probable rollback failure. (revision {last_id})");

        if self.store.major_version() == MajorVersion::Pack16 && layout::completes_pack_group(last_id as u64) {
            let root = self.root.clone();
            let tmp = self.store.temp_dir();
            let _ = tokio::task::spawn_blocking(move || repair::assemble_missing_pack_if_possible(&root, &tmp, last_id as u64))
                .await
                .expect("pack repair task panicked");
        }
        Ok(())
    }

    /* ========================= *\
    |  Resource / link resolution  |
    \* ========================= */

    /// Looks up a resource by any of its normalized-URL alternatives
    /// (original first, canonical last), returning the first match
    /// found in either the in-memory index or the database.
    pub async fn resolve_resource(&self, raw_url: &str) -> Result<Option<Arc<ResourceRow>>> {
        for candidate in resource_url_alternatives(raw_url)? {
            if let Some(id) = self.resources.id_for_url(&candidate).await {
                if let Some(cached) = self.resources.get(id).await {
                    return Ok(Some(cached));
                }
            }
            let repo = self.repository();
            if let Some(row) = repo.get_resource_by_url(&candidate).await.or_raise(|| ErrorKind::Database)? {
                return Ok(Some(self.resources.insert(row).await));
            }
        }
        Ok(None)
    }

    /// Looks up a resource, creating it under the canonical URL form
    /// if it does not yet exist.
    pub async fn get_or_create_resource(&self, raw_url: &str) -> Result<Arc<ResourceRow>> {
        if let Some(existing) = self.resolve_resource(raw_url).await? {
            return Ok(existing);
        }
        let canonical = resource_url_alternatives(raw_url)?.pop().expect("always at least one alternative");
        let repo = self.repository();
        let id = repo.insert_resource(&canonical).await.or_raise(|| ErrorKind::Database)?;
        let row = ResourceRow { id, url: canonical };
        let arc = self.resources.insert(row).await;
        self.observers.notify(|o| o.resource_did_instantiate(id)).await;
        Ok(arc)
    }

    /// Normalizes `raw_url` and applies the configured aliases, per
    /// the resolved Open Question in SPEC_FULL.md §9: normalization
    /// first, then alias rewriting.
    pub async fn resolve_link(&self, raw_url: &str) -> Result<AliasedUrl> {
        let canonical = resource_url_alternatives(raw_url)?.pop().expect("always at least one alternative");
        let aliases: Vec<AliasRow> = self.repository().list_aliases().await.or_raise(|| ErrorKind::Database)?;
        Ok(apply_alias(&canonical, &aliases))
    }

    /* ========= *\
    |  Revisions  |
    \* ========= */

    /// Persists a successful fetch: inserts the revision row, then
    /// writes its body, following SPEC_FULL.md §4.5's steps 1-7. If the
    /// body write fails, the row is deleted (best-effort rollback); if
    /// that also fails, the row survives as an orphan for the next
    /// open's repair pass to find.
    #[instrument(skip(self, body, metadata), fields(resource_id, bytes = body.len()))]
    pub async fn create_revision_with_body(
        &self,
        resource_id: i64,
        request_cookie: Option<&str>,
        metadata: &RevisionMetadata,
        body: Vec<u8>,
    ) -> Result<i64> {
        let repo = self.repository();
        let id = repo
            .insert_revision_ok(resource_id, request_cookie, metadata)
            .await
            .or_raise(|| ErrorKind::Database)?;

        if let Err(write_err) = self.store.write_body(id as u64, body).await {
            let _ = repo.delete_revision(id).await;
            return Err(write_err).or_raise(|| ErrorKind::Store);
        }

        if self.store.major_version() == MajorVersion::Pack16 && layout::completes_pack_group(id as u64) {
            // Best-effort: a failure here leaves individual files in
            // place for the next open's orphan repair (SPEC_FULL.md
            // §4.5 step 6).
            let _ = self.store.pack_if_complete(id as u64).await;
        }

        self.observers.notify(|o| o.resource_revision_did_instantiate(resource_id, id)).await;
        Ok(id)
    }

    /// Persists a fetch failure: no body is expected or written.
    pub async fn create_revision_with_error(
        &self,
        resource_id: i64,
        request_cookie: Option<&str>,
        error: &RevisionError,
    ) -> Result<i64> {
        let repo = self.repository();
        let id = repo
            .insert_revision_error(resource_id, request_cookie, error)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.observers.notify(|o| o.resource_revision_did_instantiate(resource_id, id)).await;
        Ok(id)
    }

    pub async fn default_revision(&self, resource_id: i64) -> Result<Option<RevisionRow>> {
        let repo = self.repository();
        let mut revisions = repo.list_revisions_for_resource(resource_id).await.or_raise(|| ErrorKind::Database)?;
        if let Some(pos) = revisions.iter().position(|r| !r.is_error()) {
            return Ok(Some(revisions.remove(pos)));
        }
        Ok(if self.readonly { revisions.into_iter().next() } else { None })
    }

    /* ====== *\
    |  Groups  |
    \* ====== */

    /// Deletes a group, nulling `source` on any dependent group in the
    /// same step (SPEC_FULL.md §3).
    pub async fn delete_group(&self, id: i64) -> Result<()> {
        self.repository().delete_group(id).await.or_raise(|| ErrorKind::Database)
    }

    pub async fn group_source(&self, group: &ResourceGroupRow) -> Option<(GroupSourceType, i64)> {
        group.source()
    }

    /* =========== *\
    |  Hibernation  |
    \* =========== */

    /// Persists an encoded scheduler snapshot for the next open to pick
    /// up (SPEC_FULL.md §4.6 Hibernation).
    pub async fn save_hibernate_snapshot(&self, encoded: &str) -> Result<()> {
        self.repository().set_property(PROPERTY_HIBERNATE_SNAPSHOT, encoded).await.or_raise(|| ErrorKind::Database)
    }

    /// Reads and clears this project's pending hibernation snapshot, if
    /// any. Cleared unconditionally on read so a snapshot is restored
    /// at most once even if the caller fails to apply it.
    pub async fn take_hibernate_snapshot(&self) -> Result<Option<String>> {
        let repo = self.repository();
        let encoded = repo.get_property(PROPERTY_HIBERNATE_SNAPSHOT).await.or_raise(|| ErrorKind::Database)?;
        if encoded.is_some() {
            repo.delete_property(PROPERTY_HIBERNATE_SNAPSHOT).await.or_raise(|| ErrorKind::Database)?;
        }
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_db::models::RevisionMetadata;

    #[tokio::test]
    async fn create_starts_at_pack16_and_has_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path()).await.unwrap();
        assert_eq!(project.store().major_version(), MajorVersion::Pack16);
        assert!(project.resolve_resource("http://example.com/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_or_create_resource_is_idempotent_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path()).await.unwrap();
        let a = project.get_or_create_resource("HTTP://Example.com/x").await.unwrap();
        let b = project.get_or_create_resource("http://example.com/x").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.url, "http://example.com/x");
    }

    #[tokio::test]
    async fn revision_with_body_round_trips_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path()).await.unwrap();
        let resource = project.get_or_create_resource("http://example.com/").await.unwrap();
        let id = project
            .create_revision_with_body(resource.id, None, &RevisionMetadata::default(), b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(project.store().read(id as u64).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn reopening_a_project_with_a_missing_trailing_body_repairs_it() {
        let dir = tempfile::tempdir().unwrap();
        let resource_id;
        let bad_id;
        {
            let project = Project::create(dir.path()).await.unwrap();
            let resource = project.get_or_create_resource("http://example.com/").await.unwrap();
            resource_id = resource.id;
            for _ in 0..3 {
                project
                    .create_revision_with_body(resource_id, None, &RevisionMetadata::default(), b"ok".to_vec())
                    .await
                    .unwrap();
            }
            // Simulate a crash between the DB commit and the body
            // rename: insert a row directly with no body on disk.
            let repo = project.repository();
            bad_id = repo
                .insert_revision_ok(resource_id, None, &RevisionMetadata::default())
                .await
                .unwrap();
        }

        let reopened = Project::open(dir.path(), false).await.unwrap();
        let err = reopened.repository().get_revision(bad_id).await.unwrap_err();
        assert!(matches!(&*err, crystal_db::error::ErrorKind::RevisionNotFound(_)));
        let _ = resource_id;
    }

    #[tokio::test]
    async fn hibernate_snapshot_round_trips_and_clears_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path()).await.unwrap();
        assert_eq!(project.take_hibernate_snapshot().await.unwrap(), None);

        project.save_hibernate_snapshot("{\"entries\":[]}").await.unwrap();
        assert_eq!(project.take_hibernate_snapshot().await.unwrap(), Some("{\"entries\":[]}".to_string()));
        assert_eq!(project.take_hibernate_snapshot().await.unwrap(), None);
    }
}

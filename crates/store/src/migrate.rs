//! Filesystem-level revision store migrations.
//!
//! These functions move bytes around on disk; they know nothing about
//! `major_version` bookkeeping in `project_property` — that's owned by
//! the project lifecycle code, which calls these in the right order
//! and persists the version marker around them (see SPEC_FULL.md
//! §4.2 and the root crate's `lifecycle` module).

use crate::error::{ErrorKind, Result};
use crate::fs::rename_durable;
use crate::layout::{self, MAX_REVISION_ID};
use crate::pack;
use std::path::Path;

pub const IN_PROGRESS_REVISIONS_DIRNAME: &str = "revisions.inprogress";

/// Migrates every id in `ids` (ascending order expected, but not
/// required for correctness — only for the leaf-flush optimization) to
/// its v2 hierarchical path under `revisions.inprogress/` alongside the
/// v1 `revisions/` tree. A missing source file is treated as already
/// migrated (a resumed migration), not an error — this is what makes
/// an interrupted v1→v2 migration resumable.
#[tracing::instrument(skip(ids, on_progress), fields(count))]
pub fn migrate_v1_to_v2(
    project_root: &Path,
    ids: impl IntoIterator<Item = u64>,
    mut on_progress: impl FnMut(u64),
) -> Result<()> {
    let flat_root = project_root.join("revisions");
    let ip_root = project_root.join(IN_PROGRESS_REVISIONS_DIRNAME);

    if !ip_root.exists() {
        std::fs::create_dir(&ip_root).map_err(ErrorKind::from)?;
    }

    let mut last_parent: Option<std::path::PathBuf> = None;
    let mut count = 0u64;
    for id in ids {
        if id > MAX_REVISION_ID {
            return Err(ErrorKind::IdOutOfRange(id).into());
        }

        let old_path = layout::flat_path(&flat_root, id);
        let new_path = layout::hierarchical_path(&ip_root, id);
        let new_parent = layout::hierarchical_parent(&ip_root, id);

        if last_parent.as_deref() != Some(new_parent.as_path()) {
            std::fs::create_dir_all(&new_parent).map_err(ErrorKind::from)?;
            last_parent = Some(new_parent.clone());
        }

        match std::fs::rename(&old_path, &new_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Either already migrated by a previous, interrupted
                // attempt at this migration, or was missing before
                // and will remain missing. Either way, not an error.
            }
            Err(err) => return Err(ErrorKind::from(err).into()),
        }

        if layout::completes_leaf_directory(id) {
            crate::fs::flush_directory(&new_parent)?;
        }

        count += 1;
        on_progress(count);
    }

    tracing::Span::current().record("count", count);
    Ok(())
}

/// Flushes the parent directory of the highest migrated id once more,
/// independent of whether that id happened to complete a `fff` leaf —
/// the rename loop only flushes leaf-completing ids, so the very last
/// leaf touched needs an explicit final flush before commit.
pub fn flush_final_leaf(project_root: &Path, max_id: u64) -> Result<()> {
    let ip_root = project_root.join(IN_PROGRESS_REVISIONS_DIRNAME);
    crate::fs::flush_directory(&layout::hierarchical_parent(&ip_root, max_id))
}

/// The commit step of a v1→v2 migration: moves the old flat tree aside
/// (queued for deletion under `tmp/`) and durably renames
/// `revisions.inprogress` to `revisions`. Callers must have already
/// persisted `major_version = 2` to `project_property` before calling
/// this (a crash between that write and this rename resumes correctly
/// on reopen, since `revisions.inprogress` still exists).
pub fn commit_migrate_v1_to_v2(project_root: &Path) -> Result<()> {
    let flat_root = project_root.join("revisions");
    let ip_root = project_root.join(IN_PROGRESS_REVISIONS_DIRNAME);
    let tmp_root = project_root.join("tmp").join("revisions");

    if flat_root.exists() {
        if let Some(parent) = tmp_root.parent() {
            std::fs::create_dir_all(parent).map_err(ErrorKind::from)?;
        }
        std::fs::rename(&flat_root, &tmp_root).map_err(ErrorKind::from)?;
    }
    rename_durable(&ip_root, &flat_root)
}

/// Whether a v1→v2 migration was interrupted mid-flight (its presence
/// is the resumability marker, per the original implementation).
pub fn migration_in_progress(project_root: &Path) -> bool {
    project_root.join(IN_PROGRESS_REVISIONS_DIRNAME).exists()
}

/// Packs every complete group of 16 in `[0, max_id]` whose pack file is
/// absent, in ascending order, tolerating missing individuals (a
/// partially-packed-then-interrupted group can have some individuals
/// already deleted from a previous attempt). Reports progress via
/// `on_progress(revisions_processed)` roughly once per call, leaving
/// pacing to the caller. Returns the number of groups actually built
/// (idempotent: a fully up-to-date v3 project builds zero).
#[tracing::instrument(skip(on_progress), fields(max_id))]
pub fn migrate_v2_to_v3(
    project_root: &Path,
    max_id: u64,
    mut on_progress: impl FnMut(u64),
) -> Result<u64> {
    let revisions_root = project_root.join("revisions");
    let tmp_root = project_root.join("tmp");
    std::fs::create_dir_all(&tmp_root).map_err(ErrorKind::from)?;

    let mut built = 0u64;
    let mut pack_start = 0u64;
    loop {
        let pack_end = pack_start + layout::PACK_SIZE - 1;
        if pack_end > max_id {
            break;
        }

        if !pack::pack_exists(&revisions_root, pack_end) {
            let members: Vec<(String, Vec<u8>)> = (pack_start..=pack_end)
                .filter_map(|id| {
                    let path = layout::hierarchical_path(&revisions_root, id);
                    std::fs::read(&path)
                        .ok()
                        .map(|bytes| (layout::pack_entry_name(id), bytes))
                })
                .collect();
            if !members.is_empty() {
                pack::build_pack(&revisions_root, &tmp_root, pack_end, &members)?;
                for id in pack_start..=pack_end {
                    let _ = std::fs::remove_file(layout::hierarchical_path(&revisions_root, id));
                }
                built += 1;
            }
        }

        pack_start += layout::PACK_SIZE;
        on_progress(pack_start);
    }
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_flat(root: &Path, id: u64, bytes: &[u8]) {
        std::fs::create_dir_all(root.join("revisions")).unwrap();
        std::fs::write(root.join("revisions").join(id.to_string()), bytes).unwrap();
    }

    #[test]
    fn v1_to_v2_moves_every_revision_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for id in 0..5 {
            write_flat(root, id, format!("body{id}").as_bytes());
        }

        migrate_v1_to_v2(root, 0..5, |_| {}).unwrap();
        flush_final_leaf(root, 4).unwrap();
        commit_migrate_v1_to_v2(root).unwrap();

        assert!(!migration_in_progress(root));
        for id in 0..5 {
            let path = layout::hierarchical_path(&root.join("revisions"), id);
            assert_eq!(std::fs::read(path).unwrap(), format!("body{id}").as_bytes());
        }
    }

    #[test]
    fn v1_to_v2_resumes_when_some_files_already_moved() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for id in 0..3 {
            write_flat(root, id, format!("body{id}").as_bytes());
        }

        // Simulate a partially completed migration: id 0 already moved.
        let ip_root = root.join(IN_PROGRESS_REVISIONS_DIRNAME);
        let new_path = layout::hierarchical_path(&ip_root, 0);
        std::fs::create_dir_all(new_path.parent().unwrap()).unwrap();
        std::fs::rename(root.join("revisions").join("0"), &new_path).unwrap();

        // Resuming should not error on id 0's now-missing flat file.
        migrate_v1_to_v2(root, 0..3, |_| {}).unwrap();
        for id in 0..3 {
            let path = layout::hierarchical_path(&ip_root, id);
            assert_eq!(std::fs::read(path).unwrap(), format!("body{id}").as_bytes());
        }
    }

    #[test]
    fn v2_to_v3_packs_complete_groups_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let revisions = root.join("revisions");
        for id in 0..16 {
            let path = layout::hierarchical_path(&revisions, id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, format!("body{id}").as_bytes()).unwrap();
        }

        let built = migrate_v2_to_v3(root, 15, |_| {}).unwrap();
        assert_eq!(built, 1);
        assert!(pack::pack_exists(&revisions, 15));
        assert!(!layout::hierarchical_path(&revisions, 0).exists());

        // Second pass over the same range does no further work.
        let built_again = migrate_v2_to_v3(root, 15, |_| {}).unwrap();
        assert_eq!(built_again, 0);
    }

    #[test]
    fn v2_to_v3_leaves_incomplete_final_group_as_individuals() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let revisions = root.join("revisions");
        for id in 0..10 {
            let path = layout::hierarchical_path(&revisions, id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"x").unwrap();
        }

        let built = migrate_v2_to_v3(root, 9, |_| {}).unwrap();
        assert_eq!(built, 0);
        for id in 0..10 {
            assert!(layout::hierarchical_path(&revisions, id).exists());
        }
    }
}

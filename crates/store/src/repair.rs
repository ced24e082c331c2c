//! Filesystem-level helpers for orphan-revision repair (SPEC_FULL.md
//! §4.8). The decision of *which* revision ids to probe, and the
//! deletion of the orphaned database row, belong to `crystal-model`;
//! this module only answers "does this revision's body exist and
//! read cleanly" and "can a missing pack be assembled right now".

use crate::layout;
use crate::pack;
use std::path::Path;

/// Whether a revision's body can be opened and read successfully,
/// given the project's current major version. Used both for the
/// normal read path and for orphan-repair probing.
pub fn body_readable(project_root: &Path, major_version: layout::MajorVersion, id: u64) -> bool {
    use layout::MajorVersion::*;
    match major_version {
        Flat => std::fs::read(layout::flat_path(&project_root.join("revisions"), id)).is_ok(),
        Hierarchical => {
            std::fs::read(layout::hierarchical_path(&project_root.join("revisions"), id)).is_ok()
        }
        Pack16 => {
            let revisions_root = project_root.join("revisions");
            if pack::pack_exists(&revisions_root, id) {
                pack::read_entry(&revisions_root, id).is_ok()
            } else {
                std::fs::read(layout::hierarchical_path(&revisions_root, id)).is_ok()
            }
        }
    }
}

/// If `id` completes a pack group (`id % 16 == 15`), the group's pack
/// is missing, and at least one individual file from that group still
/// exists on disk, assembles the pack now. No-op otherwise. This is
/// the v3-specific half of orphan repair's §4.8 final paragraph.
pub fn assemble_missing_pack_if_possible(
    project_root: &Path,
    tmp_dir: &Path,
    id: u64,
) -> crate::error::Result<bool> {
    if !layout::completes_pack_group(id) {
        return Ok(false);
    }
    let revisions_root = project_root.join("revisions");
    if pack::pack_exists(&revisions_root, id) {
        return Ok(false);
    }

    let start = layout::pack_group_start_id(id);
    let members: Vec<(String, Vec<u8>)> = (start..=id)
        .filter_map(|member_id| {
            let path = layout::hierarchical_path(&revisions_root, member_id);
            std::fs::read(&path)
                .ok()
                .map(|bytes| (layout::pack_entry_name(member_id), bytes))
        })
        .collect();
    if members.is_empty() {
        return Ok(false);
    }

    crate::pack::build_pack(&revisions_root, tmp_dir, id, &members)?;
    for member_id in start..=id {
        let _ = std::fs::remove_file(layout::hierarchical_path(&revisions_root, member_id));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout::MajorVersion;

    #[test]
    fn body_readable_false_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!body_readable(dir.path(), MajorVersion::Hierarchical, 4));
    }

    #[test]
    fn body_readable_true_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = layout::hierarchical_path(&dir.path().join("revisions"), 4);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"ok").unwrap();
        assert!(body_readable(dir.path(), MajorVersion::Hierarchical, 4));
    }

    #[test]
    fn assembles_pack_from_surviving_individuals() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let revisions = root.join("revisions");
        for id in 0..16 {
            let path = layout::hierarchical_path(&revisions, id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"x").unwrap();
        }
        let tmp = root.join("tmp");
        std::fs::create_dir_all(&tmp).unwrap();

        let assembled = assemble_missing_pack_if_possible(root, &tmp, 15).unwrap();
        assert!(assembled);
        assert!(pack::pack_exists(&revisions, 15));
    }

    #[test]
    fn no_op_when_id_does_not_complete_a_group() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tmp");
        std::fs::create_dir_all(&tmp).unwrap();
        assert!(!assemble_missing_pack_if_possible(dir.path(), &tmp, 4).unwrap());
    }
}

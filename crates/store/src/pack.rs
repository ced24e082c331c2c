//! Pack16 container construction and reading.
//!
//! A pack is a standard uncompressed ZIP64 archive (`ZIP_STORED`,
//! `allowZip64=true`) holding up to 16 revision bodies, entries named
//! by the last two hex digits of their revision id. Construction is a
//! simple concatenation; reading seeks directly to the named entry.

use crate::error::{ErrorKind, Result};
use crate::fs::rename_durable;
use crate::layout;
use std::io::{Read, Write};
use std::path::Path;

/// Builds the pack for the group ending at `pack_end_id` from the
/// given `(entry_name, source_file_bytes)` pairs, writing it to a temp
/// file under `tmp_dir` and atomically renaming it to the final pack
/// path. Never creates an empty pack file (mirrors the original
/// implementation's early return on an empty `revision_files` map) —
/// this matters when every contributing individual has already been
/// removed by a previous, interrupted pack attempt.
#[tracing::instrument(skip(members), fields(pack_end_id, entry_count = members.len()))]
pub fn build_pack(
    revisions_root: &Path,
    tmp_dir: &Path,
    pack_end_id: u64,
    members: &[(String, Vec<u8>)],
) -> Result<()> {
    let dest = layout::pack_path(revisions_root, pack_end_id);
    if members.is_empty() {
        return Err(ErrorKind::EmptyPack(dest).into());
    }

    let tmp_path = tmp_dir.join(format!("pack-{pack_end_id}.zip.tmp"));
    {
        let file = std::fs::File::create(&tmp_path).map_err(ErrorKind::from)?;
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .large_file(true);
        for (entry_name, bytes) in members {
            writer
                .start_file(entry_name, options)
                .map_err(|e| ErrorKind::CorruptPack(dest.clone(), e.to_string()))?;
            writer.write_all(bytes).map_err(ErrorKind::from)?;
        }
        let mut file = writer
            .finish()
            .map_err(|e| ErrorKind::CorruptPack(dest.clone(), e.to_string()))?;
        file.sync_all().map_err(ErrorKind::from)?;
    }

    rename_durable(&tmp_path, &dest)
}

/// Reads the entry for `id` out of the pack ending at `pack_end_id`.
pub fn read_entry(revisions_root: &Path, id: u64) -> Result<Vec<u8>> {
    let pack_end_id = layout::pack_group_end_id(id);
    let pack_path = layout::pack_path(revisions_root, pack_end_id);
    let entry_name = layout::pack_entry_name(id);

    let file = std::fs::File::open(&pack_path).map_err(ErrorKind::from)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ErrorKind::CorruptPack(pack_path.clone(), e.to_string()))?;
    let mut entry = archive
        .by_name(&entry_name)
        .map_err(|e| ErrorKind::CorruptPack(pack_path.clone(), e.to_string()))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf).map_err(ErrorKind::from)?;
    Ok(buf)
}

/// Whether the pack for the group containing `id` exists on disk.
pub fn pack_exists(revisions_root: &Path, id: u64) -> bool {
    layout::pack_path(revisions_root, layout::pack_group_end_id(id)).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_read_round_trips_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let revisions = dir.path().join("revisions");
        let tmp = dir.path().join("tmp");
        std::fs::create_dir_all(&tmp).unwrap();

        let members: Vec<_> = (0..16)
            .map(|id| (layout::pack_entry_name(id), format!("body-{id}").into_bytes()))
            .collect();

        build_pack(&revisions, &tmp, 15, &members).unwrap();
        assert!(pack_exists(&revisions, 7));

        for id in 0..16 {
            let bytes = read_entry(&revisions, id).unwrap();
            assert_eq!(bytes, format!("body-{id}").into_bytes());
        }
    }

    #[test]
    fn refuses_to_build_an_empty_pack() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_pack(dir.path(), dir.path(), 15, &[]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyPack(_)));
    }
}

//! Atomic-write durability primitives.
//!
//! Every write to the revisions tree follows the same discipline: write
//! to a temp file, fsync it, rename it into place, then fsync the
//! parent directory so the rename itself survives a crash. This
//! mirrors `flush_renames_in_directory` / `flush_rename_of_file` from
//! the original implementation. The primitives are synchronous —
//! pack construction and migration both do their I/O from blocking
//! contexts (`spawn_blocking`) rather than the async executor, since
//! they are filesystem-bound rather than network-bound.

use crate::error::{ErrorKind, Result};
use std::io::Write;
use std::path::Path;

/// Writes `data` to a fresh temp file under `tmp_dir`, fsyncs it, then
/// atomically renames it to `dest`, fsyncing `dest`'s parent directory
/// afterwards. Creates `dest`'s parent directory (and retries the
/// rename once) if it does not yet exist — the original implementation
/// hits this on first-write-of-a-new-leaf during migration.
#[tracing::instrument(skip(data), fields(dest = %dest.display(), bytes = data.len()))]
pub fn write_atomic(tmp_dir: &Path, dest: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = tmp_dir.join(format!(".crystal-write-{}.tmp", uniq_suffix()));
    {
        let mut file = std::fs::File::create(&tmp_path).map_err(ErrorKind::from)?;
        file.write_all(data).map_err(ErrorKind::from)?;
        file.sync_all().map_err(ErrorKind::from)?;
    }
    rename_durable(&tmp_path, dest)
}

/// Renames `from` to `to`, creating `to`'s parent directory and
/// retrying once if the first attempt fails because the parent is
/// missing, then flushes `to`'s parent directory.
pub fn rename_durable(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(ErrorKind::from)?;
            }
            std::fs::rename(from, to).map_err(ErrorKind::from)?;
        }
        Err(err) => return Err(ErrorKind::from(err).into()),
    }
    if let Some(parent) = to.parent() {
        flush_directory(parent)?;
    }
    Ok(())
}

/// Fsyncs a directory so that renames/creates/deletes within it are
/// durable. Platforms whose filesystems don't support directory
/// flushing are treated as a no-op, following the original
/// implementation's `ENOTSUP`/`ENOSYS`/`EINVAL` swallowing.
pub fn flush_directory(dir: &Path) -> Result<()> {
    match std::fs::File::open(dir).and_then(|f| f.sync_all()) {
        Ok(()) => Ok(()),
        Err(err) => match err.raw_os_error() {
            Some(errno) if is_unsupported_errno(errno) => Ok(()),
            _ => Err(ErrorKind::from(err).into()),
        },
    }
}

#[cfg(unix)]
fn is_unsupported_errno(errno: i32) -> bool {
    // EINVAL, ENOTSUP/EOPNOTSUPP, ENOSYS
    matches!(errno, 22 | 95 | 38)
}

#[cfg(not(unix))]
fn is_unsupported_errno(_errno: i32) -> bool {
    true
}

fn uniq_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", std::process::id(), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_missing_parent_and_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/c/file");
        write_atomic(dir.path(), &dest, b"hello").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn rename_durable_overwrites_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("src");
        let to = dir.path().join("dst");
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old").unwrap();
        rename_durable(&from, &to).unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
    }
}

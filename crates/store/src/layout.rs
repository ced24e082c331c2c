//! On-disk path computation for the three revision store layouts.
//!
//! A revision id is a monotonic integer bounded by [`MAX_REVISION_ID`]
//! (`2^60 - 1`, carried over from the original implementation's
//! `Project._MAX_REVISION_ID` — the limit exists because the v2
//! hierarchical layout only has room for 15 hex digits of id).

use std::path::PathBuf;

/// Largest revision id representable by the v2/v3 on-disk layouts.
pub const MAX_REVISION_ID: u64 = (1u64 << 60) - 1;

/// Number of revisions grouped into one Pack16 container.
pub const PACK_SIZE: u64 = 16;

/// The major on-disk format version of a project's revision store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MajorVersion {
    /// `revisions/<id>` — flat, read-only compatibility only.
    Flat = 1,
    /// `revisions/abc/def/ghi/jkl/mno` — 15 hex digit hierarchy.
    Hierarchical = 2,
    /// Hierarchical, with complete groups of 16 packed into ZIP64
    /// containers.
    Pack16 = 3,
}

impl MajorVersion {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Flat),
            2 => Some(Self::Hierarchical),
            3 => Some(Self::Pack16),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Renders a revision id as the 15 lowercase hex digits used by the
/// v2/v3 layouts, e.g. `1` → `000000000000001`.
pub fn hex15(id: u64) -> String {
    format!("{id:015x}")
}

/// `revisions/<id>` (v1, flat).
pub fn flat_path(revisions_root: &std::path::Path, id: u64) -> PathBuf {
    revisions_root.join(id.to_string())
}

/// `revisions/abc/def/ghi/jkl/mno` (v2, hierarchical). Four
/// intermediate directory levels of three hex digits each, the leaf
/// file named by the final three.
pub fn hierarchical_path(revisions_root: &std::path::Path, id: u64) -> PathBuf {
    let digits = hex15(id);
    let mut path = revisions_root.to_path_buf();
    for chunk in digits.as_bytes().chunks(3).take(4) {
        path.push(std::str::from_utf8(chunk).expect("hex digits are ASCII"));
    }
    path.push(&digits[12..15]);
    path
}

/// Parent directory of [`hierarchical_path`], i.e. everything but the
/// leaf file name. Used to decide when a rename has landed in a new
/// leaf directory that needs flushing.
pub fn hierarchical_parent(revisions_root: &std::path::Path, id: u64) -> PathBuf {
    let digits = hex15(id);
    let mut path = revisions_root.to_path_buf();
    for chunk in digits.as_bytes().chunks(3).take(4) {
        path.push(std::str::from_utf8(chunk).expect("hex digits are ASCII"));
    }
    path
}

/// Id of the last member of the 16-wide pack group containing `id`.
pub fn pack_group_end_id(id: u64) -> u64 {
    (id / PACK_SIZE) * PACK_SIZE + (PACK_SIZE - 1)
}

/// Id of the first member of the 16-wide pack group containing `id`.
pub fn pack_group_start_id(id: u64) -> u64 {
    (id / PACK_SIZE) * PACK_SIZE
}

/// Path of the Pack16 container holding the group ending at
/// `pack_end_id`: the v2-style hierarchical path of that id.
pub fn pack_path(revisions_root: &std::path::Path, pack_end_id: u64) -> PathBuf {
    hierarchical_path(revisions_root, pack_end_id)
}

/// Name of the entry within a Pack16 container for member `id`: the
/// last two hex digits of its id.
pub fn pack_entry_name(id: u64) -> String {
    let digits = hex15(id);
    digits[13..15].to_string()
}

/// Whether `id` is the last member of its pack group (its hierarchical
/// path ends in `f`).
pub fn completes_pack_group(id: u64) -> bool {
    id % PACK_SIZE == PACK_SIZE - 1
}

/// Whether `id`'s hierarchical path lands in a leaf directory ending
/// in `fff` — the v1→v2 migration flushes at these boundaries.
pub fn completes_leaf_directory(id: u64) -> bool {
    hex15(id).ends_with("fff")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn hex15_pads_to_fifteen_digits() {
        assert_eq!(hex15(1), "000000000000001");
        assert_eq!(hex15(0xabc), "000000000000abc");
    }

    #[test]
    fn hierarchical_path_splits_into_four_levels_plus_leaf() {
        let root = Path::new("/proj/revisions");
        let path = hierarchical_path(root, 1);
        assert_eq!(
            path,
            Path::new("/proj/revisions/000/000/000/000/001")
        );
    }

    #[test]
    fn pack_group_boundaries() {
        assert_eq!(pack_group_start_id(0), 0);
        assert_eq!(pack_group_end_id(0), 15);
        assert_eq!(pack_group_start_id(15), 0);
        assert_eq!(pack_group_end_id(16), 31);
        assert_eq!(pack_group_start_id(31), 16);
    }

    #[test]
    fn entry_name_is_last_two_hex_digits() {
        assert_eq!(pack_entry_name(0), "00");
        assert_eq!(pack_entry_name(15), "0f");
        assert_eq!(pack_entry_name(16), "10");
    }

    #[test]
    fn completes_pack_group_on_multiples_of_sixteen_minus_one() {
        assert!(completes_pack_group(15));
        assert!(!completes_pack_group(14));
        assert!(completes_pack_group(31));
    }

    #[test]
    fn max_revision_id_matches_fifteen_hex_digits() {
        assert_eq!(hex15(MAX_REVISION_ID), "fffffffffffffff");
    }
}

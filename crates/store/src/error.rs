//! Revision store error types.
//!
//! Structured errors using `exn` for automatic location tracking and
//! error tree construction, following the same shape as the rest of
//! this workspace's crates.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for revision store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Revision body does not exist at its expected location.
    #[display("revision body not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Path contains invalid characters or escapes the store root.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A revision id is too large to be represented in the target
    /// on-disk layout (see `Project::_MAX_REVISION_ID`).
    #[display("revision id {_0} exceeds the maximum representable id")]
    IdOutOfRange(#[error(not(source))] u64),
    /// Pack construction was asked to build a pack for a group that
    /// has no contributing individual files.
    #[display("refusing to build an empty pack at {}", _0.display())]
    EmptyPack(#[error(not(source))] PathBuf),
    /// The Pack16 container is malformed or an expected entry is
    /// missing from it.
    #[display("malformed pack {}: {_1}", _0.display())]
    CorruptPack(#[error(not(source))] PathBuf, #[error(not(source))] String),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

//! Project-level errors.
//!
//! Mirrors the source implementation's exception hierarchy
//! (`ProjectReadOnlyError`, `ProjectFormatError`, `ProjectTooNewError`,
//! `RevisionBodyMissingError`) as `ErrorKind` variants, per the
//! dynamic-typing-to-tagged-variants translation in SPEC_FULL.md §9.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("project is open read-only")]
    ProjectReadOnly,
    #[display("project format is not recognized")]
    ProjectFormat,
    #[display("project major version {_0} is newer than this build supports")]
    ProjectTooNew(#[error(not(source))] u32),
    #[display("revision {_0} has no readable body")]
    RevisionBodyMissing(#[error(not(source))] i64),
    #[display("URL could not be normalized: {_0}")]
    UrlNormalization(#[error(not(source))] String),
    #[display("database error")]
    Database,
    #[display("revision store error")]
    Store,
    #[display("the migration was vetoed before any work began")]
    MigrationVetoed,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

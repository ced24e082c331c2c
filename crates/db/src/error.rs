//! Project database error types.
//!
//! This module provides structured errors using `exn` for automatic
//! location tracking and error tree construction.

use derive_more::{Display, Error};

/// A database error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("resource not found: {_0}")]
    ResourceNotFound(#[error(not(source))] i64),
    #[display("resource not found for url: {_0}")]
    UrlNotFound(#[error(not(source))] String),
    #[display("revision not found: {_0}")]
    RevisionNotFound(#[error(not(source))] i64),
    #[display("root resource name already in use: {_0}")]
    DuplicateRootResourceName(#[error(not(source))] String),
    #[display("alias source prefix already in use: {_0}")]
    DuplicateAliasPrefix(#[error(not(source))] String),
    /// Serialization/deserialization of a JSON column failed.
    #[display("invalid stored data")]
    InvalidData,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

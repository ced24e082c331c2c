//! Scheduler error types.
//!
//! Composes upward (SPEC_FULL.md §7): a lower crate's error is wrapped,
//! not flattened, so the originating error tree survives.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("project error")]
    Model,
    #[display("scheduler snapshot was malformed")]
    Snapshot,
    #[display("task was cancelled")]
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Cancelled)
    }
}

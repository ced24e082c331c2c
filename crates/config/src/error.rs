//! Configuration loading errors.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("failed to load configuration")]
    Load,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

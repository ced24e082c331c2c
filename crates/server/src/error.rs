//! Replay server error types.
//!
//! `ErrorKind`/`Error` is this crate's ordinary composable error, used
//! the way every other crate in this codebase uses `exn` — for
//! helpers like URL mapping that aren't directly an HTTP handler.
//! Handlers themselves return [`HttpError`], built explicitly at each
//! call site (SPEC_FULL.md §7: project-readonly and not-archived are
//! distinct, handler-visible outcomes, not generic failures to be
//! guessed back out of a wrapped error tree).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("malformed archive url")]
    MalformedArchiveUrl,
    #[display("server failed")]
    Serve,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// An error on its way out of an axum handler, with the status code
/// decided at the point the failure occurred.
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn not_archived() -> Self {
        Self { status: StatusCode::NOT_FOUND, message: "not in archive".to_string() }
    }

    pub fn readonly() -> Self {
        Self { status: StatusCode::FORBIDDEN, message: "project is open read-only".to_string() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal server error");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: "internal error".to_string() }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

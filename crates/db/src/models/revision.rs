//! Row for `resource_revision`, plus the JSON shapes stored in its
//! `error` and `metadata` text columns (SPEC_FULL.md §3).

use exn::ResultExt;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{ErrorKind, Result};

/// The literal string stored in `error` when a revision has no error
/// and its body exists.
pub const NO_ERROR: &str = "null";

/// A fetch failure recorded instead of a body (SPEC_FULL.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// HTTP response metadata recorded alongside a successful revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevisionMetadata {
    #[serde(default)]
    pub http_version: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub reason_phrase: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RevisionRow {
    pub id: i64,
    pub resource_id: i64,
    pub request_cookie: Option<String>,
    pub error: String,
    pub metadata: String,
}

impl RevisionRow {
    pub fn is_error(&self) -> bool {
        self.error != NO_ERROR
    }

    pub fn parsed_error(&self) -> Result<Option<RevisionError>> {
        if self.error == NO_ERROR {
            return Ok(None);
        }
        serde_json::from_str(&self.error)
            .map(Some)
            .or_raise(|| ErrorKind::InvalidData)
    }

    pub fn parsed_metadata(&self) -> Result<RevisionMetadata> {
        serde_json::from_str(&self.metadata).or_raise(|| ErrorKind::InvalidData)
    }
}

pub fn encode_error(error: Option<&RevisionError>) -> Result<String> {
    match error {
        None => Ok(NO_ERROR.to_string()),
        Some(e) => serde_json::to_string(e).or_raise(|| ErrorKind::InvalidData),
    }
}

pub fn encode_metadata(metadata: &RevisionMetadata) -> Result<String> {
    serde_json::to_string(metadata).or_raise(|| ErrorKind::InvalidData)
}

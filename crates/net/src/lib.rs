//! The downloader (SPEC_FULL.md §4.4): fetches a resource's HTTP
//! response with a configurable User-Agent, timeout and optional
//! proxy, and turns the result into data `crystal-model` can persist
//! via `Project::create_revision_with_body`/`create_revision_with_error`.
//!
//! *When* to fetch is the scheduler's job, not this crate's.

mod client;
pub mod error;

pub use crate::client::{ClientConfig, Downloader, FetchOutcome};

//! The project domain model: URL normalization, alias rewriting,
//! in-memory resource indices, listener fan-out, and project lifecycle
//! (open/create/migrate/repair) that ties `crystal-db` and
//! `crystal-store` together (SPEC_FULL.md §3, §4.2, §4.3, §4.8, §9).

pub mod alias;
pub mod error;
pub mod index;
pub mod observer;
pub mod pattern;
mod project;
pub mod url;

pub use crate::project::Project;

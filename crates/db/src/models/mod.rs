//! Row types returned by [`crate::repo::Repository`], one module per table.

mod alias;
mod property;
mod resource;
mod revision;

pub use self::alias::AliasRow;
pub use self::property::PropertyRow;
pub use self::resource::{GroupSourceType, ResourceGroupRow, ResourceRow, RootResourceRow};
pub use self::revision::{
    encode_error, encode_metadata, RevisionError, RevisionMetadata, RevisionRow, NO_ERROR,
};

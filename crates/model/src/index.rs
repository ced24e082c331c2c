//! In-memory resource indices (SPEC_FULL.md §9: pointer graphs become
//! arena + ids; `WeakValueDictionary` becomes index + refcount).
//!
//! Both indices are caches over the database, not the source of
//! truth: a miss falls back to a direct query and repopulates the
//! cache, so staleness from another writer is never a correctness
//! problem, only a cache-efficiency one.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

use crystal_db::models::ResourceRow;

#[derive(Default)]
pub struct ResourceIndex {
    by_url: RwLock<HashMap<String, i64>>,
    by_id: RwLock<HashMap<i64, Weak<ResourceRow>>>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn id_for_url(&self, url: &str) -> Option<i64> {
        self.by_url.read().await.get(url).copied()
    }

    pub async fn get(&self, id: i64) -> Option<Arc<ResourceRow>> {
        self.by_id.read().await.get(&id).and_then(Weak::upgrade)
    }

    /// Inserts or refreshes both directions of the cache, returning an
    /// `Arc` the caller can hold on to (the index itself only ever
    /// keeps a [`Weak`]).
    pub async fn insert(&self, row: ResourceRow) -> Arc<ResourceRow> {
        let id = row.id;
        let url = row.url.clone();
        let arc = Arc::new(row);
        self.by_url.write().await.insert(url, id);
        self.by_id.write().await.insert(id, Arc::downgrade(&arc));
        arc
    }

    pub async fn forget(&self, id: i64, url: &str) {
        self.by_url.write().await.remove(url);
        self.by_id.write().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_lookup_round_trips() {
        let index = ResourceIndex::new();
        let row = ResourceRow { id: 7, url: "http://example.com/".to_string() };
        let handle = index.insert(row).await;
        assert_eq!(index.id_for_url("http://example.com/").await, Some(7));
        assert_eq!(index.get(7).await.unwrap().url, handle.url);
    }

    #[tokio::test]
    async fn entry_disappears_once_the_only_strong_ref_is_dropped() {
        let index = ResourceIndex::new();
        let row = ResourceRow { id: 1, url: "http://example.com/a".to_string() };
        let handle = index.insert(row).await;
        drop(handle);
        assert!(index.get(1).await.is_none());
    }

    #[tokio::test]
    async fn forget_removes_both_directions() {
        let index = ResourceIndex::new();
        let row = ResourceRow { id: 2, url: "http://example.com/b".to_string() };
        let _handle = index.insert(row).await;
        index.forget(2, "http://example.com/b").await;
        assert_eq!(index.id_for_url("http://example.com/b").await, None);
    }
}

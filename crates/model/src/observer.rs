//! Listener fan-out (SPEC_FULL.md §9: `ListenableMixin` → typed
//! `dyn Observer` + a weak-reference set, so a dropped listener is
//! simply skipped rather than needing explicit unsubscription).

use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

/// Project-level lifecycle notifications. All methods default to a
/// no-op so observers only implement what they care about.
pub trait Observer: Send + Sync {
    fn resource_did_instantiate(&self, _resource_id: i64) {}
    fn resource_revision_did_instantiate(&self, _resource_id: i64, _revision_id: i64) {}
    fn resource_group_did_change_members(&self, _group_id: i64) {}
}

pub type ObserverHandle = Weak<dyn Observer>;

/// Holds weak references to registered observers and fans out events
/// to whichever are still alive, pruning the rest as it goes.
#[derive(Default)]
pub struct ObserverSet {
    observers: RwLock<Vec<ObserverHandle>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, observer: &Arc<dyn Observer>) {
        self.observers.write().await.push(Arc::downgrade(observer));
    }

    pub async fn notify(&self, f: impl Fn(&dyn Observer)) {
        let mut guard = self.observers.write().await;
        guard.retain(|weak| {
            if let Some(observer) = weak.upgrade() {
                f(observer.as_ref());
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl Observer for Counter {
        fn resource_did_instantiate(&self, _resource_id: i64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn notifies_live_observers_and_drops_dead_ones() {
        let set = ObserverSet::new();
        let counter: Arc<dyn Observer> = Arc::new(Counter(AtomicUsize::new(0)));
        set.subscribe(&counter).await;

        {
            let ephemeral: Arc<dyn Observer> = Arc::new(Counter(AtomicUsize::new(0)));
            set.subscribe(&ephemeral).await;
        }
        // ephemeral is now dropped; only `counter` should remain live.

        set.notify(|o| o.resource_did_instantiate(1)).await;
        assert_eq!(set.observers.read().await.len(), 1);
    }
}

//! Observer registry for list changes

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::types::User;

/// Callback invoked with the current list after every change
pub type Listener = Arc<dyn Fn(&[User]) + Send + Sync>;

type Slots = Mutex<HashMap<u64, Listener>>;

/// Registered listeners, keyed by subscription id
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    slots: Arc<Slots>,
    next_id: AtomicU64,
    /// Version of the newest list handed to listeners. Reentrant so a
    /// listener may apply events itself.
    delivered: ReentrantMutex<Cell<u64>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(id, listener);
        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Call every listener with `users`, the list at `version`.
    ///
    /// Deliveries are serialised and a list older than one already delivered
    /// is skipped, so listeners always end on the newest list. Listeners are
    /// cloned out first so a callback may subscribe or unsubscribe without
    /// deadlocking.
    pub(crate) fn notify(&self, version: u64, users: &[User]) {
        let delivered = self.delivered.lock();
        if version <= delivered.get() {
            return;
        }
        delivered.set(version);

        let listeners: Vec<Listener> = self.slots.lock().values().cloned().collect();
        for listener in listeners {
            // A listener applied an event and a newer list went out to everyone
            if delivered.get() != version {
                break;
            }
            listener(users);
        }
    }

    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Disposer returned by [`Reconciler::subscribe`](super::Reconciler::subscribe).
///
/// Dropping it unsubscribes too.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    slots: Weak<Slots>,
}

impl Subscription {
    /// Stop receiving notifications
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let registry = ListenerRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let subscription = registry.add(Arc::new(move |_: &[User]| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(registry.len(), 1);

        registry.notify(1, &[]);
        subscription.unsubscribe();
        registry.notify(2, &[]);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_older_versions_are_skipped() {
        let registry = ListenerRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let _subscription = registry.add(Arc::new(move |_: &[User]| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.notify(2, &[]);
        registry.notify(1, &[]);
        registry.notify(2, &[]);
        registry.notify(3, &[]);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscription_outlives_registry() {
        let registry = ListenerRegistry::default();
        let subscription = registry.add(Arc::new(|_: &[User]| {}));
        drop(registry);
        drop(subscription);
    }
}

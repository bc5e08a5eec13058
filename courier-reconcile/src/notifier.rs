//! Fan-out of reconciled status updates to subscribers

use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
};

use courier_common::{StatusUpdate, tracing};
use parking_lot::Mutex;

/// A subscriber callback
///
/// Called synchronously with every batch of actionable updates. Errors and
/// panics are logged and otherwise ignored.
pub type Subscriber = dyn Fn(&[StatusUpdate]) -> anyhow::Result<()> + Send + Sync;

#[derive(Default)]
struct Registry {
    subscribers: BTreeMap<u64, Arc<Subscriber>>,
    next_id: u64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("subscribers", &self.subscribers.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Set of subscribers to reconciled updates
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    registry: Arc<Mutex<Registry>>,
}

/// Handle returned by [`Notifier::subscribe`]
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
#[must_use = "the handle is the only way to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the subscriber; later calls are no-ops
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().subscribers.remove(&self.id);
        }
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[StatusUpdate]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(callback))
    }

    /// Register an already shared callback
    ///
    /// Registering the same `Arc` twice yields the original subscription
    /// rather than a second delivery.
    pub fn subscribe_shared(&self, callback: Arc<Subscriber>) -> Subscription {
        let mut registry = self.registry.lock();

        let existing = registry
            .subscribers
            .iter()
            .find(|(_, subscriber)| Arc::ptr_eq(subscriber, &callback))
            .map(|(id, _)| *id);

        let id = existing.unwrap_or_else(|| {
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.insert(id, callback);
            id
        });

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().subscribers.is_empty()
    }

    /// Deliver `updates` to every subscriber, returning how many succeeded
    ///
    /// The registry lock is not held while callbacks run, so a callback may
    /// subscribe or unsubscribe.
    pub fn notify(&self, updates: &[StatusUpdate]) -> usize {
        let subscribers: Vec<_> = self
            .registry
            .lock()
            .subscribers
            .iter()
            .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
            .collect();

        subscribers
            .into_iter()
            .filter(|(id, subscriber)| {
                match catch_unwind(AssertUnwindSafe(|| subscriber(updates))) {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::warn!(subscriber = id, error = %e, "Subscriber failed");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(subscriber = id, "Subscriber panicked");
                        false
                    }
                }
            })
            .count()
    }
}

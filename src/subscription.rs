//! Subscription registry
//!
//! Tracks every connected subscriber, its transport and its ticker interest.
//! All mutation goes through the registry's lock; readers that need to walk
//! the membership take a [`snapshot`](SubscriptionRegistry::snapshot), an
//! owned copy they can iterate while connects, disconnects and failure-driven
//! removals keep happening.

use crate::{
    data::{Interest, SubscriberState},
    error::SubscriptionError,
    transport::Transport,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle identifying one subscriber for the lifetime of the process
pub type SubscriberId = u64;

struct Entry {
    transport: Arc<dyn Transport>,
    interest: Interest,
    narrowed: bool,
    alive: bool,
    removed: watch::Sender<bool>,
}

/// Copy of one subscriber taken at snapshot time
#[derive(Clone)]
pub struct SubscriberSnapshot {
    pub id: SubscriberId,
    pub interest: Interest,
    pub alive: bool,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for SubscriberSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSnapshot")
            .field("id", &self.id)
            .field("interest", &self.interest)
            .field("alive", &self.alive)
            .finish()
    }
}

/// Registry of connected subscribers
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<SubscriberId, Entry>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber interested in every ticker
    pub fn add(&self, transport: Arc<dyn Transport>) -> SubscriberId {
        match self.add_with(transport, || Ok::<(), std::convert::Infallible>(())) {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }

    /// Register a subscriber, running `before_insert` under the write lock.
    ///
    /// No publish can snapshot the membership while `before_insert` runs, so
    /// whatever it queues on the transport lands ahead of every broadcast the
    /// new subscriber receives. An error leaves the registry untouched.
    pub fn add_with<F, E>(&self, transport: Arc<dyn Transport>, before_insert: F) -> Result<SubscriberId, E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let (id, total) = {
            let mut entries = self.entries.write();
            before_insert()?;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let (removed, _) = watch::channel(false);
            entries.insert(id, Entry {
                transport,
                interest: Interest::All,
                narrowed: false,
                alive: true,
                removed,
            });
            (id, entries.len())
        };

        tracing::info!("Subscriber {} connected. Total subscribers: {}", id, total);
        Ok(id)
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut entries = self.entries.write();
            let removed = match entries.remove(&id) {
                Some(entry) => {
                    entry.removed.send_replace(true);
                    true
                }
                None => false,
            };
            (removed, entries.len())
        };

        if removed {
            tracing::info!("Subscriber {} disconnected. Total subscribers: {}", id, total);
        }
        removed
    }

    /// Replace a subscriber's interest
    pub fn set_interest(&self, id: SubscriberId, interest: Interest) -> Result<(), SubscriptionError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&id)
            .ok_or(SubscriptionError::UnknownSubscriber(id))?;

        entry.narrowed = matches!(interest, Interest::Tickers(_));
        entry.interest = interest;
        Ok(())
    }

    /// Drop `symbols` from a narrowed interest.
    ///
    /// A subscriber still on `All` first narrows to every ticker in `universe`
    /// minus `symbols`. Emptying the set leaves the subscriber receiving nothing.
    pub fn unsubscribe(
        &self,
        id: SubscriberId,
        symbols: &[String],
        universe: &[String],
    ) -> Result<Interest, SubscriptionError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&id)
            .ok_or(SubscriptionError::UnknownSubscriber(id))?;

        let mut remaining: BTreeSet<String> = match &entry.interest {
            Interest::All => universe.iter().cloned().collect(),
            Interest::Tickers(set) => set.clone(),
        };
        for symbol in symbols {
            remaining.remove(symbol);
        }

        entry.interest = Interest::Tickers(remaining);
        entry.narrowed = true;
        Ok(entry.interest.clone())
    }

    /// Flag a subscriber for removal; the dispatcher drops it on its next publish
    pub fn mark_disconnected(&self, id: SubscriberId) -> bool {
        match self.entries.write().get_mut(&id) {
            Some(entry) => {
                entry.alive = false;
                true
            }
            None => false,
        }
    }

    /// Owned copy of the current membership, in connection order
    pub fn snapshot(&self) -> Vec<SubscriberSnapshot> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| SubscriberSnapshot {
                id: *id,
                interest: entry.interest.clone(),
                alive: entry.alive,
                transport: Arc::clone(&entry.transport),
            })
            .collect()
    }

    /// Watch that flips to `true` once `id` leaves the registry.
    ///
    /// For an unknown id the receiver already reads `true` and `changed()` returns at once.
    pub fn removal(&self, id: SubscriberId) -> watch::Receiver<bool> {
        match self.entries.read().get(&id) {
            Some(entry) => entry.removed.subscribe(),
            None => watch::channel(true).1,
        }
    }

    pub fn interest(&self, id: SubscriberId) -> Option<Interest> {
        self.entries.read().get(&id).map(|e| e.interest.clone())
    }

    pub fn state(&self, id: SubscriberId) -> SubscriberState {
        match self.entries.read().get(&id) {
            Some(entry) if !entry.alive => SubscriberState::Disconnected,
            Some(entry) if entry.narrowed => SubscriberState::Subscribed,
            Some(_) => SubscriberState::Connected,
            None => SubscriberState::Disconnected,
        }
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    fn transport() -> Arc<dyn Transport> {
        let (transport, _rx) = ChannelTransport::pair(1);
        Arc::new(transport)
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let registry = SubscriptionRegistry::new();
        let a = registry.add(transport());
        let b = registry.add(transport());
        assert_ne!(a, b);

        let ids: Vec<_> = registry.snapshot().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let id = registry.add(transport());

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(!registry.remove(9999));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let registry = SubscriptionRegistry::new();
        let id = registry.add(transport());
        assert_eq!(registry.state(id), SubscriberState::Connected);

        registry.set_interest(id, Interest::from_symbols(["AAPL"])).unwrap();
        assert_eq!(registry.state(id), SubscriberState::Subscribed);

        registry.mark_disconnected(id);
        assert_eq!(registry.state(id), SubscriberState::Disconnected);

        registry.remove(id);
        assert_eq!(registry.state(id), SubscriberState::Disconnected);
        assert_eq!(
            registry.set_interest(id, Interest::All),
            Err(SubscriptionError::UnknownSubscriber(id))
        );
    }

    #[test]
    fn test_unsubscribe_from_all_narrows_to_rest_of_universe() {
        let registry = SubscriptionRegistry::new();
        let id = registry.add(transport());
        let universe = vec!["AAPL".to_string(), "MSFT".to_string(), "TSLA".to_string()];

        let interest = registry.unsubscribe(id, &["MSFT".to_string()], &universe).unwrap();
        assert!(interest.includes("AAPL"));
        assert!(!interest.includes("MSFT"));
        assert!(interest.includes("TSLA"));
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = SubscriptionRegistry::new();
        let a = registry.add(transport());
        let snapshot = registry.snapshot();

        registry.remove(a);
        registry.add(transport());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, a);
    }

    #[test]
    fn test_removal_signal_fires_on_remove() {
        let registry = SubscriptionRegistry::new();
        let id = registry.add(transport());
        let removal = registry.removal(id);
        assert!(!*removal.borrow());

        registry.remove(id);
        assert!(*removal.borrow());
        assert!(*registry.removal(id).borrow());
    }

    #[test]
    fn test_add_with_failure_registers_nothing() {
        let registry = SubscriptionRegistry::new();
        let result = registry.add_with(transport(), || Err("queue full"));

        assert_eq!(result, Err("queue full"));
        assert!(registry.is_empty());
        assert_eq!(registry.add_with(transport(), || Ok::<(), &str>(())), Ok(1));
    }
}

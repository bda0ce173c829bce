//! Observable, atomically swappable configuration.
//!
//! Readers call [`SharedConfig::current`] on every use and never block.
//! Components that cache derived state (sampling frequency, push target)
//! subscribe and are called back after each replacement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::schema::DrumsConfig;

/// Handle returned by [`SharedConfig::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

type Observer = Arc<dyn Fn(&DrumsConfig) + Send + Sync>;

pub struct SharedConfig {
    current: ArcSwap<DrumsConfig>,
    observers: DashMap<SubscriptionId, Observer>,
    next_id: AtomicU64,
}

impl SharedConfig {
    pub fn new(config: DrumsConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            observers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// The configuration in effect right now.
    pub fn current(&self) -> Arc<DrumsConfig> {
        self.current.load_full()
    }

    /// Register a callback invoked after every replacement.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&DrumsConfig) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.insert(id, Arc::new(observer));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Swap in a new configuration and notify observers.
    ///
    /// Observers are called in no particular order and each sees the same
    /// snapshot. None may rely on another having run first.
    pub fn replace(&self, config: DrumsConfig) {
        let config = Arc::new(config);
        self.current.store(config.clone());

        // Observers run outside the map's shard locks so they may subscribe
        // or unsubscribe themselves.
        let observers: Vec<Observer> = self.observers.iter().map(|entry| entry.value().clone()).collect();
        for observer in observers {
            observer(&config);
        }
    }

    /// Derive a new configuration from the current one and swap it in.
    pub fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut DrumsConfig),
    {
        let mut next = DrumsConfig::clone(&self.current());
        change(&mut next);
        self.replace(next);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(DrumsConfig::default())
    }
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfig")
            .field("current", &self.current())
            .field("observers", &self.observers.len())
            .finish()
    }
}

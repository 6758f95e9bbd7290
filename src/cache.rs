//! Short-lived result cache.
//!
//! Entries expire lazily: a stale entry is dropped when it is read, and a full
//! sweep of expired entries runs whenever an insert pushes the store past its
//! capacity. There is no background timer.

use cached::{Cached, TimedCache};
use std::hash::Hash;
use std::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_TTL_SECS: u64 = 30;
pub const DEFAULT_CAPACITY: usize = 100;

pub struct ResultCache<K, V> {
    name: &'static str,
    capacity: usize,
    store: Mutex<TimedCache<K, V>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl_secs: u64, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            store: Mutex::new(TimedCache::with_lifespan(ttl_secs)),
        }
    }

    /// Cached value if it is younger than the TTL. A poisoned lock reads as a
    /// miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut store = match self.store.lock() {
            Ok(store) => store,
            Err(_) => {
                warn!("{} cache lock poisoned, treating lookup as a miss", self.name);
                return None;
            }
        };
        let hit = store.cache_get(key).cloned();
        debug!("{} cache {}", self.name, if hit.is_some() { "hit" } else { "miss" });
        hit
    }

    pub fn set(&self, key: K, value: V) {
        let Ok(mut store) = self.store.lock() else {
            warn!("{} cache lock poisoned, dropping write", self.name);
            return;
        };
        store.cache_set(key, value);
        if store.cache_size() > self.capacity {
            store.flush();
            debug!("{} cache swept, {} entries remain", self.name, store.cache_size());
        }
    }

    pub fn clear(&self) {
        match self.store.lock() {
            Ok(mut store) => store.cache_clear(),
            Err(poisoned) => poisoned.into_inner().cache_clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().map(|s| s.cache_size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Short-lived read cache for derived views.
//!
//! Entries expire after a fixed time-to-live measured on the game clock.
//! The cache never feeds writes: every mutation re-reads from the store.

use std::collections::HashMap;
use std::hash::Hash;

use crate::clock::Timestamp;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Timestamp,
}

/// Map whose entries expire `ttl_ms` after insertion.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl_ms: u64,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    /// Time-to-live of new entries.
    #[must_use]
    pub const fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Fresh value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &K, now: Timestamp) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    /// Store `value`, replacing any previous entry.
    pub fn insert(&mut self, key: K, value: V, now: Timestamp) {
        let expires_at = now.plus_millis(self.ttl_ms);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

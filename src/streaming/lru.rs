//! Least-recently-used store
//!
//! Keeps values keyed by `K` and evicts the oldest unused entry once the
//! store is over capacity.

use std::collections::HashMap;
use std::hash::Hash;

/// LRU store with explicit access tracking
pub struct LruStore<K, V> {
    entries: HashMap<K, V>,
    /// Oldest first, newest last
    access_order: Vec<K>,
    capacity: usize,
}

impl<K: Clone + Eq + Hash, V> LruStore<K, V> {
    /// Create a store holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            access_order: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Look up an entry and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key)
        } else {
            None
        }
    }

    /// Look up an entry without affecting recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or replace an entry, making it most recently used
    ///
    /// Replacing an existing key never evicts. Otherwise, once the store is
    /// full the least recently used entries are removed first.
    ///
    /// # Arguments
    /// * `key` - Entry key
    /// * `value` - Entry value
    ///
    /// # Returns
    /// The entries evicted to make room, oldest first
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.remove_from_access_order(&key);
        self.entries.insert(key.clone(), value);
        self.access_order.push(key);

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Remove an entry, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_from_access_order(key);
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove the least recently used entry
    pub fn evict_oldest(&mut self) -> Option<(K, V)> {
        let key = self.access_order.first()?.clone();
        let value = self.remove(&key)?;
        Some((key, value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.access_order.iter()
    }

    fn touch(&mut self, key: &K) {
        self.remove_from_access_order(key);
        self.access_order.push(key.clone());
    }

    fn remove_from_access_order(&mut self, key: &K) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
    }
}

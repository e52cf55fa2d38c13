//! Keyed cache with request coalescing
//!
//! Every key is either absent, pending (a load is in flight) or ready. Callers
//! asking for a pending key attach to the in-flight load instead of starting a
//! second one. Ready entries live in an LRU store; pending entries are never
//! evicted.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::streaming::lru::LruStore;

type LoadOutcome<T> = std::result::Result<Arc<T>, Error>;
type LoadChannel<T> = Shared<oneshot::Receiver<LoadOutcome<T>>>;

/// A cache lookup result
#[derive(Debug)]
pub struct Loaded<T> {
    /// True only when the item was already ready at request time
    pub cached: bool,
    pub item: Arc<T>,
}

impl<T> Clone for Loaded<T> {
    fn clone(&self) -> Self {
        Self {
            cached: self.cached,
            item: Arc::clone(&self.item),
        }
    }
}

/// Counters since the cache was created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a ready entry
    pub hits: u64,
    /// Requests that started a load
    pub misses: u64,
    /// Requests that attached to a pending load
    pub coalesced: u64,
    pub evictions: u64,
    pub failures: u64,
}

struct Pending<T> {
    id: u64,
    channel: LoadChannel<T>,
}

struct CacheState<T> {
    ready: LruStore<String, Arc<T>>,
    pending: HashMap<String, Pending<T>>,
    next_id: u64,
    stats: CacheStats,
}

impl<T> CacheState<T> {
    /// Settle a finished load, unless it was invalidated while in flight
    fn complete(&mut self, name: &str, key: &str, id: u64, outcome: &LoadOutcome<T>) {
        if !self.pending.get(key).is_some_and(|pending| pending.id == id) {
            log::debug!("{name}: discarding superseded load of {key}");
            return;
        }
        self.pending.remove(key);

        match outcome {
            Ok(item) => {
                for (evicted, _) in self.ready.insert(key.to_string(), Arc::clone(item)) {
                    log::debug!("{name}: evicted {evicted}");
                    self.stats.evictions += 1;
                }
            }
            Err(e) => {
                log::warn!("{name}: load of {key} failed: {e}");
                self.stats.failures += 1;
            }
        }
    }
}

enum Lookup<T> {
    Ready(Arc<T>),
    Attach(LoadChannel<T>),
    Lead {
        id: u64,
        channel: LoadChannel<T>,
        sender: oneshot::Sender<LoadOutcome<T>>,
    },
}

/// String-keyed cache of shared, immutable items
///
/// Cloning is cheap and every clone sees the same entries.
pub struct KeyedCache<T> {
    name: &'static str,
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for KeyedCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + Sync + 'static> KeyedCache<T> {
    /// Create an empty cache
    ///
    /// # Arguments
    /// * `name` - Label used in log lines and error messages
    /// * `capacity` - Maximum number of ready entries (clamped to at least 1)
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(CacheState {
                ready: LruStore::new(capacity),
                pending: HashMap::new(),
                next_id: 0,
                stats: CacheStats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the item for `key`, loading it with `load` if nobody has yet
    ///
    /// `load` is only called when the key is neither ready nor pending. The
    /// load runs as its own task, so it completes and populates the cache
    /// even if every requester stops waiting. A failed load leaves no entry
    /// behind and the next request starts over.
    ///
    /// # Arguments
    /// * `key` - Cache key
    /// * `load` - Builds the load future; called at most once per miss
    ///
    /// # Returns
    /// The item with `cached` set if it was ready at request time. Requesters
    /// attached to a pending load get its result with `cached == false`.
    ///
    /// # Errors
    /// Whatever the load returned, delivered to every attached requester. A
    /// panic while building or running the load becomes [`Error::Worker`].
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<Loaded<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let lookup = {
            let mut state = self.lock();
            if let Some(item) = state.ready.get(&key.to_string()).cloned() {
                state.stats.hits += 1;
                Lookup::Ready(item)
            } else if let Some(pending) = state.pending.get(key) {
                let channel = pending.channel.clone();
                state.stats.coalesced += 1;
                Lookup::Attach(channel)
            } else {
                state.next_id += 1;
                let id = state.next_id;
                let (sender, receiver) = oneshot::channel();
                let channel = receiver.shared();
                state.pending.insert(
                    key.to_string(),
                    Pending {
                        id,
                        channel: channel.clone(),
                    },
                );
                state.stats.misses += 1;
                Lookup::Lead { id, channel, sender }
            }
        };

        let channel = match lookup {
            Lookup::Ready(item) => {
                log::trace!("{}: hit {key}", self.name);
                return Ok(Loaded { cached: true, item });
            }
            Lookup::Attach(channel) => {
                log::trace!("{}: joined pending load of {key}", self.name);
                channel
            }
            Lookup::Lead { id, channel, sender } => {
                log::debug!("{}: loading {key}", self.name);
                match std::panic::catch_unwind(AssertUnwindSafe(load)) {
                    Ok(future) => self.spawn_load(key.to_string(), id, future, sender),
                    Err(_) => {
                        let outcome = Err(Error::Worker(format!("{}: load of {key} panicked", self.name)));
                        self.lock().complete(self.name, key, id, &outcome);
                        sender.send(outcome).ok();
                    }
                }
                channel
            }
        };

        match channel.await {
            Ok(outcome) => outcome.map(|item| Loaded { cached: false, item }),
            Err(_) => Err(Error::Worker(format!(
                "{}: load of {key} was dropped before completing",
                self.name
            ))),
        }
    }

    fn spawn_load<Fut>(&self, key: String, id: u64, load: Fut, sender: oneshot::Sender<LoadOutcome<T>>)
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let name = self.name;
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(load).catch_unwind().await {
                Ok(result) => result.map(Arc::new),
                Err(_) => Err(Error::Worker(format!("{name}: load of {key} panicked"))),
            };

            // Settle before notifying, so requesters woken by the send find
            // the entry ready rather than pending.
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .complete(name, &key, id, &outcome);

            sender.send(outcome).ok();
        });
    }

    /// Ready item for `key`, marking it recently used
    ///
    /// # Returns
    /// `None` while the key is absent or still pending
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let mut state = self.lock();
        let item = state.ready.get(&key.to_string()).cloned();
        if item.is_some() {
            state.stats.hits += 1;
        }
        item
    }

    /// Whether `key` is ready
    pub fn contains(&self, key: &str) -> bool {
        self.lock().ready.contains(&key.to_string())
    }

    /// Whether a load for `key` is in flight
    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().pending.contains_key(key)
    }

    /// Drop `key` whether ready or pending
    ///
    /// A pending load keeps running and its requesters still receive the result,
    /// but its result is not cached.
    ///
    /// # Returns
    /// `true` if there was anything to drop
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        let was_ready = state.ready.remove(&key.to_string()).is_some();
        let was_pending = state.pending.remove(key).is_some();
        was_ready || was_pending
    }

    /// Drop every entry, ready and pending
    pub fn clear(&self) {
        let mut state = self.lock();
        state.ready.clear();
        state.pending.clear();
        log::debug!("{}: cleared", self.name);
    }

    /// Number of ready entries
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ready.is_empty()
    }

    /// Number of loads in flight
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().ready.capacity()
    }

    /// Ready keys from least to most recently used
    pub fn keys(&self) -> Vec<String> {
        self.lock().ready.keys().cloned().collect()
    }

    /// Counters since creation
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counted(counter: &Arc<AtomicUsize>, value: u32) -> impl Future<Output = Result<u32>> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_load() {
        let cache = KeyedCache::<u32>::new("test", 8);
        let counter = Arc::new(AtomicUsize::new(0));

        let requests = (0..4).map(|_| cache.get_or_load("a", || counted(&counter, 7)));
        let results = futures::future::join_all(requests).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            let loaded = result.as_ref().unwrap();
            assert!(!loaded.cached);
            assert!(Arc::ptr_eq(&loaded.item, &first.item));
        }

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 3);
        assert_eq!(cache.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_request_is_cached() {
        let cache = KeyedCache::<u32>::new("test", 8);
        let counter = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_load("a", || counted(&counter, 1)).await.unwrap();
        let second = cache.get_or_load("a", || counted(&counter, 2)).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(*second.item, 1);
        assert!(Arc::ptr_eq(&first.item, &second.item));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = KeyedCache::<u32>::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c"] {
            cache.get_or_load(key, || counted(&counter, 0)).await.unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);

        // Evicted entries load again
        let again = cache.get_or_load("a", || counted(&counter, 0)).await.unwrap();
        assert!(!again.cached);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_hit_refreshes_recency() {
        let cache = KeyedCache::<u32>::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));

        cache.get_or_load("a", || counted(&counter, 0)).await.unwrap();
        cache.get_or_load("b", || counted(&counter, 0)).await.unwrap();
        assert!(cache.get_or_load("a", || counted(&counter, 0)).await.unwrap().cached);
        cache.get_or_load("c", || counted(&counter, 0)).await.unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.keys(), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_load_is_purged_and_retried() {
        let cache = KeyedCache::<u32>::new("test", 8);

        let err = cache
            .get_or_load("a", || async { Err(Error::decode("test", "broken")) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(!cache.contains("a"));
        assert!(!cache.is_pending("a"));
        assert_eq!(cache.stats().failures, 1);

        let loaded = cache.get_or_load("a", || async { Ok(3) }).await.unwrap();
        assert!(!loaded.cached);
        assert_eq!(*loaded.item, 3);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter() {
        let cache = KeyedCache::<u32>::new("test", 8);

        let requests = (0..3).map(|_| {
            cache.get_or_load("a", || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(Error::decode("test", "broken"))
            })
        });
        let results = futures::future::join_all(requests).await;

        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_panicking_load_becomes_worker_error() {
        let cache = KeyedCache::<u32>::new("test", 8);

        let err = cache
            .get_or_load("a", || async {
                if true {
                    panic!("decoder exploded");
                }
                Ok(0)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
        assert!(!cache.is_pending("a"));
    }

    #[tokio::test]
    async fn test_load_that_panics_before_its_future_is_built() {
        let cache = KeyedCache::<u32>::new("test", 8);

        let err = cache
            .get_or_load("a", || -> std::future::Ready<Result<u32>> { panic!("bad key") })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
        assert!(!cache.is_pending("a"));
        assert_eq!(cache.stats().failures, 1);

        let loaded = cache.get_or_load("a", || async { Ok(7) }).await.unwrap();
        assert_eq!(*loaded.item, 7);
    }

    #[tokio::test]
    async fn test_invalidate_during_load_discards_result() {
        let cache = KeyedCache::<u32>::new("test", 8);
        let (release, gate) = oneshot::channel::<()>();

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load("a", move || async move {
                        gate.await.ok();
                        Ok(9)
                    })
                    .await
            })
        };

        while !cache.is_pending("a") {
            tokio::task::yield_now().await;
        }
        assert!(cache.invalidate("a"));
        assert!(!cache.is_pending("a"));

        release.send(()).ok();
        let loaded = waiter.await.unwrap().unwrap();
        assert_eq!(*loaded.item, 9);
        assert!(!cache.contains("a"));
    }

    #[tokio::test]
    async fn test_get_and_clear() {
        let cache = KeyedCache::<u32>::new("test", 8);
        assert!(cache.get("a").is_none());

        cache.get_or_load("a", || async { Ok(1) }).await.unwrap();
        cache.get_or_load("b", || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.get("a").as_deref(), Some(&1));

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.invalidate("a"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = KeyedCache::<u32>::new("test", 0);
        assert_eq!(cache.capacity(), 1);
    }
}

//! Eviction notifications.
//!
//! Every collection that discards a non-empty gen1 produces an
//! [`EvictionBatch`], which is handed to each registered
//! [`EvictionListener`] together with the [`CacheId`] of the cache (or
//! partition) that evicted it.
//!
//! ## Delivery
//!
//! Caches collect batches while holding their lock and dispatch them after
//! the lock has been released. A listener may therefore call back into the
//! cache that notified it. Partitions of a
//! [`PartitionedCache`](crate::policy::partitioned::PartitionedCache) evict
//! independently, so one listener registered on a partitioned cache can be
//! invoked concurrently from several threads; the `Send + Sync` bound on
//! [`EvictionListener`] enforces that.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use gencache::policy::direct::DirectCache;
//! use gencache::config::CacheConfig;
//!
//! let cache: DirectCache<u32, u32> = DirectCache::new(CacheConfig::with_gen0_limit(2));
//! let evicted = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&evicted);
//! cache.subscribe(Arc::new(move |_source, batch| {
//!     counter.fetch_add(batch.len(), Ordering::Relaxed);
//! }));
//!
//! for key in 0..5 {
//!     cache.insert(key, key);
//! }
//! assert_eq!(evicted.load(Ordering::Relaxed), 2);
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one cache instance.
///
/// Each partition of a partitioned cache has its own id, which lets a shared
/// listener tell partitions apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(u64);

impl CacheId {
    /// Allocates a fresh id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache#{}", self.0)
    }
}

/// The gen1 map discarded by one collection.
#[derive(Debug, Clone)]
pub struct EvictionBatch<K, T> {
    entries: FxHashMap<K, T>,
}

impl<K, T> PartialEq for EvictionBatch<K, T>
where
    K: Eq + Hash,
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K, T> Eq for EvictionBatch<K, T>
where
    K: Eq + Hash,
    T: Eq,
{
}

impl<K, T> EvictionBatch<K, T>
where
    K: Eq + Hash,
{
    pub(crate) fn new(entries: FxHashMap<K, T>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Consumes the batch and returns the evicted map.
    pub fn into_inner(self) -> FxHashMap<K, T> {
        self.entries
    }
}

/// Callback invoked with `(source, batch)` after a collection evicts entries.
pub type EvictionListener<K, T> = Arc<dyn Fn(CacheId, &EvictionBatch<K, T>) + Send + Sync>;

/// Registry of eviction listeners for one cache.
pub struct EvictionListeners<K, T> {
    listeners: RwLock<Vec<EvictionListener<K, T>>>,
}

impl<K, T> Default for EvictionListeners<K, T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<K, T> fmt::Debug for EvictionListeners<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictionListeners")
            .field("len", &self.len())
            .finish()
    }
}

impl<K, T> EvictionListeners<K, T> {
    pub fn subscribe(&self, listener: EvictionListener<K, T>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `batch` to every listener.
    ///
    /// The registry lock is released before the first callback runs, so a
    /// listener may subscribe further listeners; those only see later batches.
    pub fn notify(&self, source: CacheId, batch: &EvictionBatch<K, T>) {
        let listeners: Vec<EvictionListener<K, T>> = self.listeners.read().clone();
        for listener in listeners {
            listener(source, batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    fn batch_of(pairs: &[(u32, &'static str)]) -> EvictionBatch<u32, &'static str> {
        EvictionBatch::new(pairs.iter().copied().collect())
    }

    #[test]
    fn cache_ids_are_unique() {
        let a = CacheId::next();
        let b = CacheId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("cache#"));
    }

    #[test]
    fn batch_accessors() {
        let batch = batch_of(&[(1, "a"), (2, "b")]);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.get(&1), Some(&"a"));
        assert!(batch.contains_key(&2));
        assert!(!batch.contains_key(&3));

        let mut keys: Vec<_> = batch.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(batch.into_inner().len(), 2);
    }

    #[test]
    fn batches_compare_by_contents() {
        let batch = batch_of(&[(1, "a"), (2, "b")]);
        assert_eq!(batch, batch_of(&[(2, "b"), (1, "a")]));
        assert_ne!(batch, batch_of(&[(1, "a"), (2, "c")]));
        assert_ne!(batch, batch_of(&[(1, "a")]));
        assert_eq!(batch.clone(), batch);
    }

    #[test]
    fn notify_reaches_every_listener() {
        let listeners: EvictionListeners<u32, &'static str> = EvictionListeners::default();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            listeners.subscribe(Arc::new(move |_, batch| {
                seen.fetch_add(batch.len(), Ordering::SeqCst);
            }));
        }
        assert_eq!(listeners.len(), 3);

        listeners.notify(CacheId::next(), &batch_of(&[(1, "a"), (2, "b")]));
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn listener_may_subscribe_during_notify() {
        let listeners: Arc<EvictionListeners<u32, &'static str>> =
            Arc::new(EvictionListeners::default());
        let registry = Arc::clone(&listeners);
        listeners.subscribe(Arc::new(move |_, _| {
            registry.subscribe(Arc::new(|_, _| {}));
        }));

        listeners.notify(CacheId::next(), &batch_of(&[(1, "a")]));
        assert_eq!(listeners.len(), 2);
    }
}

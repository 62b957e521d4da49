//! Generational cache without a backing source.
//!
//! Values enter a [`DirectCache`] only through [`insert`](DirectCache::insert)
//! (or the bulk helpers); a miss returns `None` and inserts nothing.
//!
//! ## Example Usage
//!
//! ```
//! use gencache::config::CacheConfig;
//! use gencache::policy::direct::DirectCache;
//!
//! let cache: DirectCache<&str, u32> = DirectCache::new(CacheConfig::with_gen0_limit(2));
//! cache.insert("a", 1);
//! cache.insert("b", 2);
//! cache.insert("c", 3); // gen0 full: collect first, then insert
//!
//! assert_eq!(cache.len(), 3);
//! assert_eq!(cache.get(&"a"), Some(1)); // promoted back into gen0
//! assert_eq!(cache.get(&"z"), None);
//! ```
//!
//! ## Thread Safety
//!
//! `DirectCache` is `Send + Sync`; one `parking_lot::Mutex` guards both
//! generations. Share it with `Arc` or wrap it in a
//! [`PartitionedCache`](crate::policy::partitioned::PartitionedCache) to
//! spread lock contention.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;

use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::policy::events::{CacheId, EvictionListener};
use crate::policy::generational::{CacheGuard, GenerationalCore};
use crate::policy::sweep::Sweeper;
use crate::traits::{AsyncCache, CoreCache};

/// Generational cache with explicit inserts only.
pub struct DirectCache<K, V>
where
    K: Eq + Hash,
{
    core: Arc<GenerationalCore<K, V>>,
    config: CacheConfig,
    _sweeper: Option<Sweeper>,
}

impl<K, V> fmt::Debug for DirectCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectCache")
            .field("id", &self.core.id())
            .field("len", &self.core.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for DirectCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an unbounded cache.
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<K, V> DirectCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a cache, starting a sweep thread if `time_to_live` is set.
    pub fn new(config: CacheConfig) -> Self {
        let core = Arc::new(GenerationalCore::new(config.gen0_limit));
        let sweeper = Sweeper::for_core(&core, &config);
        Self {
            core,
            config,
            _sweeper: sweeper,
        }
    }

    /// Like [`new`](Self::new), but rejects invalid configuration.
    pub fn try_new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }
}

impl<K, V> DirectCache<K, V>
where
    K: Eq + Hash,
{
    /// Process-unique id, also passed to eviction listeners.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let a: DirectCache<u32, u32> = DirectCache::new(CacheConfig::unbounded());
    /// let b: DirectCache<u32, u32> = DirectCache::new(CacheConfig::unbounded());
    /// assert_ne!(a.id(), b.id());
    /// ```
    pub fn id(&self) -> CacheId {
        self.core.id()
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a clone of the value for `key`, promoting it out of gen1.
    ///
    /// Records a hit or a miss in [`metrics`](Self::metrics).
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let cache = DirectCache::new(CacheConfig::unbounded());
    /// cache.insert(1, "one");
    /// cache.force_collect(); // "one" now sits in gen1
    ///
    /// assert_eq!(cache.get(&1), Some("one"));
    /// assert_eq!(cache.force_collect(), 0); // promoted, so it survives
    /// assert_eq!(cache.get(&2), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.core.get_cloned(key)
    }

    /// Returns a clone of the value for `key` without promoting it.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.core.peek_cloned(key)
    }

    /// Returns `true` if `key` is resident in either generation. Does not
    /// promote.
    pub fn contains(&self, key: &K) -> bool {
        self.core.contains(key)
    }

    /// Inserts or overwrites `key`.
    ///
    /// A new key arriving while gen0 is at its limit triggers a collection
    /// first. Overwrites never collect.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let cache = DirectCache::new(CacheConfig::with_gen0_limit(1));
    /// cache.insert("a", 1);
    /// cache.insert("a", 2); // overwrite, no collection
    /// cache.insert("b", 3); // gen0 full: "a" ages into gen1
    ///
    /// assert_eq!(cache.peek(&"a"), Some(2));
    /// assert_eq!(cache.metrics().collections, 1);
    /// ```
    pub fn insert(&self, key: K, value: V) {
        self.core.insert(key, value);
    }

    /// Removes `key` from whichever generation holds it.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let cache = DirectCache::new(CacheConfig::unbounded());
    /// cache.insert(7, "seven");
    ///
    /// assert_eq!(cache.remove(&7), Some("seven"));
    /// assert_eq!(cache.remove(&7), None);
    /// assert!(cache.is_empty());
    /// ```
    pub fn remove(&self, key: &K) -> Option<V> {
        self.core.remove(key)
    }

    /// Drops every entry in both generations without notifying listeners.
    pub fn clear(&self) {
        self.core.clear();
    }

    /// Number of entries across both generations.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let cache = DirectCache::new(CacheConfig::unbounded());
    /// cache.insert(1, 1);
    /// cache.force_collect();
    /// cache.insert(2, 2);
    ///
    /// assert_eq!(cache.len(), 2);
    /// ```
    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Runs one collection and returns the number of entries evicted.
    pub fn force_collect(&self) -> usize {
        self.core.force_collect()
    }

    /// Copies both generations without promoting anything.
    pub fn snapshot(&self) -> FxHashMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.core.snapshot()
    }

    /// Locks the cache for a batch of operations.
    ///
    /// Evictions caused while the guard is held reach listeners once it is
    /// dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let cache = DirectCache::new(CacheConfig::unbounded());
    /// {
    ///     let mut guard = cache.lock();
    ///     guard.insert(1, 10);
    ///     guard.insert(2, 20);
    ///     assert_eq!(guard.len(), 2);
    /// }
    /// assert_eq!(cache.get(&2), Some(20));
    /// ```
    pub fn lock(&self) -> CacheGuard<'_, K, V> {
        self.core.lock()
    }

    /// Inserts or overwrites every pair while taking the lock once.
    pub fn add_or_update_range<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut guard = self.lock();
        for (key, value) in entries {
            guard.insert(key, value);
        }
    }

    /// Removes every key while taking the lock once. Returns how many were
    /// resident.
    pub fn remove_range<'k, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'k K>,
        K: 'k,
    {
        let mut guard = self.lock();
        keys.into_iter()
            .filter(|key| guard.remove(key).is_some())
            .count()
    }

    /// Registers a listener for eviction batches.
    ///
    /// Listeners run after the cache lock is released and may call back
    /// into the cache.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::direct::DirectCache;
    ///
    /// let cache = DirectCache::new(CacheConfig::unbounded());
    /// let evicted = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&evicted);
    /// cache.subscribe(Arc::new(move |_, batch| {
    ///     counter.fetch_add(batch.len(), Ordering::SeqCst);
    /// }));
    ///
    /// cache.insert(1, 1);
    /// cache.force_collect();
    /// cache.force_collect();
    /// assert_eq!(evicted.load(Ordering::SeqCst), 1);
    /// ```
    pub fn subscribe(&self, listener: EvictionListener<K, V>) {
        self.core.subscribe(listener);
    }

    /// Point-in-time copy of the cache counters.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.core.metrics()
    }
}

impl<K, V> CoreCache<K, V> for DirectCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    type Entry = V;
    type Lookup = Option<V>;

    fn get(&self, key: &K) -> Option<V> {
        DirectCache::get(self, key)
    }

    fn insert(&self, key: K, value: V) {
        DirectCache::insert(self, key, value);
    }

    fn remove(&self, key: &K) -> Option<V> {
        DirectCache::remove(self, key)
    }

    fn clear(&self) {
        DirectCache::clear(self);
    }

    fn len(&self) -> usize {
        DirectCache::len(self)
    }

    fn force_collect(&self) -> usize {
        DirectCache::force_collect(self)
    }

    fn subscribe(&self, listener: EvictionListener<K, V>) {
        DirectCache::subscribe(self, listener);
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        DirectCache::metrics(self)
    }
}

impl<K, V> AsyncCache<K, V> for DirectCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Option<V>> {
        Box::pin(futures::future::ready(DirectCache::get(self, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    fn limited(limit: usize) -> DirectCache<&'static str, u32> {
        DirectCache::new(CacheConfig::with_gen0_limit(limit))
    }

    #[test]
    fn direct_cache_basic_ops() {
        let cache = limited(4);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert!(cache.contains(&"a"));
        assert_eq!(cache.len(), 1);

        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove(&"a"), Some(2));
        assert_eq!(cache.remove(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn miss_inserts_nothing() {
        let cache = limited(4);
        assert_eq!(cache.get(&"missing"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().misses, 1);
    }

    #[test]
    fn documented_two_limit_scenario() {
        let cache = limited(2);
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        cache.subscribe(Arc::new(move |_, batch| {
            let mut keys: Vec<&'static str> = batch.keys().copied().collect();
            keys.sort_unstable();
            sink.lock().push(keys);
        }));

        cache.insert("A", 1);
        cache.insert("B", 2);
        cache.insert("C", 3);
        {
            let guard = cache.lock();
            assert_eq!(guard.generations().gen0_len(), 1);
            assert_eq!(guard.generations().gen1_len(), 2);
        }
        cache.insert("D", 4);
        assert_eq!(cache.get(&"A"), Some(1));
        {
            let guard = cache.lock();
            let generations = guard.generations();
            assert!(generations.in_gen0(&"C"));
            assert!(generations.in_gen0(&"D"));
            assert!(generations.in_gen0(&"A"));
            assert!(generations.in_gen1(&"B"));
        }

        cache.insert("E", 5);
        {
            let guard = cache.lock();
            let generations = guard.generations();
            assert_eq!(generations.gen0_len(), 1);
            assert!(generations.in_gen0(&"E"));
            assert_eq!(generations.gen1_len(), 3);
        }
        assert_eq!(*batches.lock(), vec![vec!["B"]]);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn snapshot_does_not_promote() {
        let cache = limited(8);
        cache.insert("old", 1);
        cache.force_collect();
        cache.insert("new", 2);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(cache.lock().generations().in_gen1(&"old"));
        assert_eq!(cache.peek(&"old"), Some(1));
        assert!(cache.lock().generations().in_gen1(&"old"));
    }

    #[test]
    fn bulk_helpers_apply_under_one_lock() {
        let cache: DirectCache<u32, u32> = DirectCache::new(CacheConfig::with_gen0_limit(4));
        cache.add_or_update_range((0..10).map(|i| (i, i * 10)));
        // 0..=3 were evicted by the second collection.
        assert_eq!(cache.len(), 6);
        assert_eq!(cache.metrics().collections, 2);
        assert_eq!(cache.get(&9), Some(90));

        let removed = cache.remove_range(&[0, 9, 42]);
        assert_eq!(removed, 1);
        assert!(!cache.contains(&9));
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn listener_may_reenter_cache() {
        let cache = Arc::new(limited(1));
        let observed = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&cache);
        let seen = Arc::clone(&observed);
        cache.subscribe(Arc::new(move |_, _| {
            if let Some(cache) = weak.upgrade() {
                seen.store(cache.len(), Ordering::SeqCst);
            }
        }));

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn eviction_source_is_cache_id() {
        let cache = limited(1);
        let sources = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sources);
        cache.subscribe(Arc::new(move |source, _| sink.lock().push(source)));

        for key in ["a", "b", "c"] {
            cache.insert(key, 0);
        }
        assert_eq!(*sources.lock(), vec![cache.id()]);
    }

    #[test]
    fn clear_does_not_notify() {
        let cache = limited(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache.subscribe(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn try_new_rejects_zero_ttl() {
        let config = CacheConfig {
            time_to_live: Some(Duration::ZERO),
            ..CacheConfig::default()
        };
        assert!(DirectCache::<u32, u32>::try_new(config).is_err());
    }

    #[test]
    fn ttl_sweep_evicts_unread_entries() {
        let cache: DirectCache<u32, u32> = DirectCache::new(CacheConfig {
            gen0_limit: None,
            time_to_live: Some(Duration::from_millis(5)),
        });
        cache.insert(1, 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !cache.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn trait_object_usage() {
        fn warm<C: CoreCache<u32, u32>>(cache: &C) {
            for i in 0..4 {
                cache.insert(i, i);
            }
        }
        let cache: DirectCache<u32, u32> = DirectCache::default();
        warm(&cache);
        assert_eq!(CoreCache::len(&cache), 4);
        assert_eq!(
            futures::executor::block_on(cache.get_async(&3)),
            Some(3)
        );
    }
}

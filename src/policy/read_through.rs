//! Generational cache that loads missing keys from a [`DataSource`].
//!
//! ## Load Protocol
//!
//! ```text
//!   get(k)
//!     │
//!     ▼  lock
//!   gen0 / gen1 hit? ──yes──▶ return (gen1 hits are promoted)
//!     │ no
//!     ▼  capture version, unlock
//!   source.load(k)            ◀── only suspension point, no lock held
//!     │
//!     ▼  lock
//!   version unchanged? ──yes──▶ insert into gen0, return loaded value
//!     │ no
//!     ▼
//!   k resident now? ──yes──▶ return resident value, drop loaded one
//!     │ no
//!     ▼
//!   insert into gen0, return loaded value
//! ```
//!
//! Reads and writes of other keys proceed while a slow load is in flight.
//! Two callers missing the same key at the same time both reach the source;
//! wrap the source in a
//! [`ThunderingHerdGuard`](crate::source::herd::ThunderingHerdGuard) to
//! collapse those into one load.
//!
//! ## Miss Memoization
//!
//! The cache stores `Option<V>`. A source answer of `Ok(None)` is stored as
//! `None` and served from memory until it is evicted, so repeated lookups of
//! an absent key do not reach the source. Errors are never stored: the next
//! caller retries the load.
//!
//! ## Example Usage
//!
//! ```
//! use gencache::config::CacheConfig;
//! use gencache::policy::read_through::ReadThroughCache;
//! use gencache::source::FnSource;
//!
//! let source = FnSource::new(|key: &u32| -> Result<Option<String>, std::io::Error> {
//!     Ok((*key < 10).then(|| format!("value-{key}")))
//! });
//! let cache: ReadThroughCache<u32, String, _> =
//!     ReadThroughCache::new(CacheConfig::with_gen0_limit(128), source);
//!
//! assert_eq!(cache.get(&3).unwrap(), Some("value-3".to_string()));
//! assert_eq!(cache.get(&42).unwrap(), None); // miss is memoized
//! assert_eq!(cache.len(), 2);
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::policy::events::{CacheId, EvictionListener};
use crate::policy::generational::{CacheGuard, GenerationalCore, Version};
use crate::policy::sweep::Sweeper;
use crate::traits::{AsyncCache, CoreCache, DataSource};

/// Result of the lock-protected first lookup.
enum FastPath<V> {
    Hit(Option<V>),
    Miss(Version),
}

/// Generational cache backed by a data source.
pub struct ReadThroughCache<K, V, S>
where
    K: Eq + Hash,
{
    core: Arc<GenerationalCore<K, Option<V>>>,
    source: S,
    config: CacheConfig,
    _sweeper: Option<Sweeper>,
}

impl<K, V, S> fmt::Debug for ReadThroughCache<K, V, S>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("id", &self.core.id())
            .field("len", &self.core.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K, V, S> ReadThroughCache<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a cache over `source`, starting a sweep thread if
    /// `time_to_live` is set.
    pub fn new(config: CacheConfig, source: S) -> Self {
        let core = Arc::new(GenerationalCore::new(config.gen0_limit));
        let sweeper = Sweeper::for_core(&core, &config);
        Self {
            core,
            source,
            config,
            _sweeper: sweeper,
        }
    }

    /// Like [`new`](Self::new), but rejects invalid configuration.
    pub fn try_new(config: CacheConfig, source: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config, source))
    }
}

impl<K, V, S> ReadThroughCache<K, V, S>
where
    K: Eq + Hash,
{
    /// Process-unique id, also passed to eviction listeners.
    pub fn id(&self) -> CacheId {
        self.core.id()
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The backing source consulted on misses.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the resident entry for `key` without promoting it or
    /// consulting the source. `Some(None)` is a memoized miss.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::read_through::ReadThroughCache;
    /// use gencache::source::FnSource;
    ///
    /// let source = FnSource::new(|key: &u32| -> Result<Option<u32>, std::io::Error> {
    ///     Ok((*key < 100).then_some(key * 10))
    /// });
    /// let cache: ReadThroughCache<u32, u32, _> =
    ///     ReadThroughCache::new(CacheConfig::unbounded(), source);
    ///
    /// assert_eq!(cache.peek(&1), None); // never loaded
    /// cache.get(&1).unwrap();
    /// cache.get(&500).unwrap();
    /// assert_eq!(cache.peek(&1), Some(Some(10)));
    /// assert_eq!(cache.peek(&500), Some(None));
    /// ```
    pub fn peek(&self, key: &K) -> Option<Option<V>>
    where
        V: Clone,
    {
        self.core.peek_cloned(key)
    }

    /// Returns `true` if `key` is resident, memoized misses included.
    pub fn contains(&self, key: &K) -> bool {
        self.core.contains(key)
    }

    /// Inserts or overwrites `key` with a known value.
    ///
    /// An insert also replaces a memoized miss, and wins over a load of the
    /// same key that is still in flight.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::read_through::ReadThroughCache;
    /// use gencache::source::FnSource;
    ///
    /// let source = FnSource::new(|key: &u32| -> Result<Option<u32>, std::io::Error> {
    ///     Ok((*key < 100).then_some(key * 10))
    /// });
    /// let cache: ReadThroughCache<u32, u32, _> =
    ///     ReadThroughCache::new(CacheConfig::unbounded(), source);
    ///
    /// cache.get(&500).unwrap(); // memoized as absent
    /// cache.insert(500, 1);
    /// assert_eq!(cache.get(&500).unwrap(), Some(1));
    /// ```
    pub fn insert(&self, key: K, value: V) {
        self.core.insert(key, Some(value));
    }

    /// Removes `key`; `Some(None)` means a memoized miss was dropped.
    ///
    /// The next [`get`](Self::get) of `key` consults the source again.
    pub fn remove(&self, key: &K) -> Option<Option<V>> {
        self.core.remove(key)
    }

    /// Drops every entry, memoized misses included, without notifying
    /// listeners.
    pub fn clear(&self) {
        self.core.clear();
    }

    /// Number of resident entries, memoized misses included.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::read_through::ReadThroughCache;
    /// use gencache::source::FnSource;
    ///
    /// let source = FnSource::new(|key: &u32| -> Result<Option<u32>, std::io::Error> {
    ///     Ok((*key < 100).then_some(key * 10))
    /// });
    /// let cache: ReadThroughCache<u32, u32, _> =
    ///     ReadThroughCache::new(CacheConfig::unbounded(), source);
    ///
    /// cache.get(&1).unwrap();
    /// cache.get(&500).unwrap();
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

    /// Copies both generations, memoized misses included, without
    /// promoting anything.
    pub fn snapshot(&self) -> FxHashMap<K, Option<V>>
    where
        K: Clone,
        V: Clone,
    {
        self.core.snapshot()
    }

    /// Locks the cache for a batch of operations. Inserting `None` through
    /// the guard records a known-absent key.
    pub fn lock(&self) -> CacheGuard<'_, K, Option<V>> {
        self.core.lock()
    }

    /// Inserts or overwrites every pair while taking the lock once.
    pub fn add_or_update_range<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut guard = self.lock();
        for (key, value) in entries {
            guard.insert(key, Some(value));
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

    /// Registers a listener for eviction batches. Batches carry memoized
    /// misses as `None`.
    pub fn subscribe(&self, listener: EvictionListener<K, Option<V>>) {
        self.core.subscribe(listener);
    }

    /// Point-in-time copy of the cache counters.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::read_through::ReadThroughCache;
    /// use gencache::source::FnSource;
    ///
    /// let source = FnSource::new(|key: &u32| -> Result<Option<u32>, std::io::Error> {
    ///     Ok((*key < 100).then_some(key * 10))
    /// });
    /// let cache: ReadThroughCache<u32, u32, _> =
    ///     ReadThroughCache::new(CacheConfig::unbounded(), source);
    ///
    /// cache.get(&3).unwrap();
    /// cache.get(&3).unwrap();
    /// let metrics = cache.metrics();
    /// assert_eq!((metrics.hits, metrics.misses, metrics.loads), (1, 1, 1));
    /// ```
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.core.metrics()
    }

    fn fast_path(&self, key: &K) -> FastPath<V>
    where
        V: Clone,
    {
        let mut state = self.core.lock();
        match state.get(key) {
            Some(entry) => {
                let entry = entry.clone();
                drop(state);
                self.core.counters().inc_hit();
                FastPath::Hit(entry)
            },
            None => {
                let version = state.version();
                drop(state);
                self.core.counters().inc_miss();
                FastPath::Miss(version)
            },
        }
    }

    /// Stores a value loaded outside the lock, unless a racing writer got
    /// there first.
    fn complete_load(&self, key: &K, version: Version, loaded: Option<V>) -> Option<V>
    where
        K: Clone,
        V: Clone,
    {
        self.core.counters().inc_load();
        let mut state = self.core.lock();
        if state.version() != version {
            if let Some(resident) = state.get(key) {
                trace!(
                    "{}: load raced a concurrent insert, keeping resident entry",
                    self.core.id()
                );
                return resident.clone();
            }
        }
        state.insert(key.clone(), loaded.clone());
        loaded
    }

    fn load_failed(&self, err: &dyn std::error::Error) {
        self.core.counters().inc_load_failure();
        debug!("{}: data source load failed: {}", self.core.id(), err);
    }
}

impl<K, V, S> ReadThroughCache<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + 'static,
    S: DataSource<K, V>,
{
    /// Returns the entry for `key`, loading it from the source on a miss.
    ///
    /// The source is called without the cache lock held. Source errors are
    /// returned unchanged and not cached.
    pub fn get(&self, key: &K) -> Result<Option<V>, S::Error> {
        let version = match self.fast_path(key) {
            FastPath::Hit(entry) => return Ok(entry),
            FastPath::Miss(version) => version,
        };
        let loaded = self.source.load(key).inspect_err(|err| self.load_failed(err))?;
        Ok(self.complete_load(key, version, loaded))
    }

    /// Asynchronous [`get`](Self::get).
    ///
    /// Dropping the returned future before it completes abandons this
    /// caller's load without touching the cache.
    pub async fn get_async(&self, key: &K) -> Result<Option<V>, S::Error> {
        let version = match self.fast_path(key) {
            FastPath::Hit(entry) => return Ok(entry),
            FastPath::Miss(version) => version,
        };
        let loaded = self
            .source
            .load_async(key)
            .await
            .inspect_err(|err| self.load_failed(err))?;
        Ok(self.complete_load(key, version, loaded))
    }
}

impl<K, V, S> CoreCache<K, V> for ReadThroughCache<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync + 'static,
    S: DataSource<K, V>,
{
    type Entry = Option<V>;
    type Lookup = Result<Option<V>, S::Error>;

    fn get(&self, key: &K) -> Self::Lookup {
        ReadThroughCache::get(self, key)
    }

    fn insert(&self, key: K, value: V) {
        ReadThroughCache::insert(self, key, value);
    }

    fn remove(&self, key: &K) -> Option<Option<V>> {
        ReadThroughCache::remove(self, key)
    }

    fn clear(&self) {
        ReadThroughCache::clear(self);
    }

    fn len(&self) -> usize {
        ReadThroughCache::len(self)
    }

    fn force_collect(&self) -> usize {
        ReadThroughCache::force_collect(self)
    }

    fn subscribe(&self, listener: EvictionListener<K, Option<V>>) {
        ReadThroughCache::subscribe(self, listener);
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        ReadThroughCache::metrics(self)
    }
}

impl<K, V, S> AsyncCache<K, V> for ReadThroughCache<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync + 'static,
    S: DataSource<K, V>,
{
    fn get_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Self::Lookup> {
        ReadThroughCache::get_async(self, key).boxed()
    }
}

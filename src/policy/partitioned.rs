//! Hash-partitioned cache.
//!
//! ## Architecture
//!
//! ```text
//!                      PartitionedCache<K, V, C>
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │  selector: PartitionSelector (seeded hash, mask or modulo)       │
//!   │                                                                  │
//!   │   key ──▶ partition_index(key)                                   │
//!   │               │                                                  │
//!   │     ┌─────────┼──────────┬──────────────┐                        │
//!   │     ▼         ▼          ▼              ▼                        │
//!   │  ┌──────┐  ┌──────┐  ┌──────┐       ┌──────┐                     │
//!   │  │  C   │  │  C   │  │  C   │  ...  │  C   │   one lock each     │
//!   │  └──┬───┘  └──┬───┘  └──┬───┘       └──┬───┘                     │
//!   │     └─────────┴─────┬───┴──────────────┘                         │
//!   │                     ▼                                            │
//!   │            eviction listeners (fan-in)                           │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each partition is an independent cache with its own lock, generations,
//! and sweeper. Single-key operations touch exactly one partition; `len`,
//! `clear`, `force_collect` and `metrics` visit every partition one at a
//! time without a global lock, so their results are not a point-in-time
//! snapshot under concurrent writes.
//!
//! ## Sizing
//!
//! The gen0 limit is divided across partitions with integer division: a
//! limit of 100 over 8 partitions gives each partition a limit of 12. See
//! [`CacheConfig::per_partition`].
//!
//! ## Eviction Fan-In
//!
//! [`subscribe`](PartitionedCache::subscribe) registers the listener on every
//! partition. Partitions collect independently, so the listener may run on
//! several threads at once; the [`CacheId`](crate::policy::events::CacheId)
//! passed with each batch names the partition that produced it.
//!
//! ## Example Usage
//!
//! ```
//! use gencache::config::CacheConfig;
//! use gencache::policy::partitioned::PartitionedCache;
//!
//! let cache = PartitionedCache::direct(CacheConfig::with_gen0_limit(1024), Some(4)).unwrap();
//! cache.insert("a", 1);
//! cache.insert("b", 2);
//!
//! assert_eq!(cache.get(&"a"), Some(1));
//! assert_eq!(cache.len(), 2);
//! assert_eq!(cache.partition_count(), 4);
//! ```

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::thread;

use futures::future::BoxFuture;
use log::debug;

use crate::config::CacheConfig;
use crate::ds::PartitionSelector;
use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::policy::direct::DirectCache;
use crate::policy::events::EvictionListener;
use crate::policy::read_through::ReadThroughCache;
use crate::traits::{AsyncCache, CoreCache};

/// Seed for partition routing; fixed so routing is stable across instances.
const ROUTING_SEED: u64 = 0;

/// A cache split across independently locked partitions.
pub struct PartitionedCache<K, V, C = DirectCache<K, V>> {
    partitions: Box<[C]>,
    selector: PartitionSelector,
    config: CacheConfig,
    _marker: PhantomData<fn(K, V)>,
}

impl<K, V, C> fmt::Debug for PartitionedCache<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedCache")
            .field("partitions", &self.partitions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Default partition count: the host's available parallelism, or 1.
pub fn default_partition_count() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

impl<K, V, C> PartitionedCache<K, V, C> {
    /// Builds `partitions` caches (default: available parallelism) with
    /// `factory`, handing each its share of `config`.
    ///
    /// Fails if `partitions` is `Some(0)` or `config` is invalid.
    pub fn new<F>(
        config: CacheConfig,
        partitions: Option<usize>,
        mut factory: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut(CacheConfig) -> C,
    {
        config.validate()?;
        let count = match partitions {
            Some(requested) => NonZeroUsize::new(requested)
                .ok_or_else(|| ConfigError::new("partition count must be at least 1"))?,
            None => default_partition_count(),
        };
        let per_partition = config.per_partition(count);
        debug!(
            "creating {} partitions with gen0 limit {:?} each",
            count, per_partition.gen0_limit
        );

        let partitions = (0..count.get()).map(|_| factory(per_partition)).collect();
        Ok(Self {
            partitions,
            selector: PartitionSelector::new(count, ROUTING_SEED),
            config,
            _marker: PhantomData,
        })
    }

    /// The configuration before it was split across partitions.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of partitions, fixed at construction.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// The partition at `index`, if it exists.
    pub fn partition(&self, index: usize) -> Option<&C> {
        self.partitions.get(index)
    }

    /// All partitions in routing order.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::partitioned::PartitionedCache;
    ///
    /// let cache = PartitionedCache::direct(CacheConfig::with_gen0_limit(64), Some(4)).unwrap();
    /// cache.insert(1_u32, "one");
    ///
    /// let holder = cache.partition_index(&1);
    /// assert_eq!(cache.partitions()[holder].get(&1), Some("one"));
    /// assert_eq!(cache.partitions().iter().map(|p| p.len()).sum::<usize>(), 1);
    /// ```
    pub fn partitions(&self) -> &[C] {
        &self.partitions
    }
}

impl<K, V> PartitionedCache<K, V, DirectCache<K, V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Partitioned [`DirectCache`].
    pub fn direct(config: CacheConfig, partitions: Option<usize>) -> Result<Self, ConfigError> {
        Self::new(config, partitions, DirectCache::new)
    }
}

impl<K, V, S> PartitionedCache<K, V, ReadThroughCache<K, V, S>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: Clone,
{
    /// Partitioned [`ReadThroughCache`]; every partition gets a clone of
    /// `source`.
    ///
    /// To coalesce loads across partitions, pass an
    /// `Arc<ThunderingHerdGuard<..>>` so all partitions share one in-flight
    /// table.
    pub fn read_through(
        config: CacheConfig,
        partitions: Option<usize>,
        source: S,
    ) -> Result<Self, ConfigError> {
        Self::new(config, partitions, |config| {
            ReadThroughCache::new(config, source.clone())
        })
    }
}

impl<K, V, C> PartitionedCache<K, V, C>
where
    K: Hash,
{
    /// Index of the partition that owns `key`.
    #[inline]
    pub fn partition_index(&self, key: &K) -> usize {
        self.selector.partition_for_key(key)
    }

    /// The partition that owns `key`.
    #[inline]
    pub fn partition_for(&self, key: &K) -> &C {
        &self.partitions[self.partition_index(key)]
    }
}

impl<K, V, C> PartitionedCache<K, V, C>
where
    K: Hash,
    C: CoreCache<K, V>,
{
    /// Looks `key` up in the partition that owns it.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::partitioned::PartitionedCache;
    ///
    /// let cache = PartitionedCache::direct(CacheConfig::with_gen0_limit(64), Some(4)).unwrap();
    /// cache.insert("a", 1);
    ///
    /// assert_eq!(cache.get(&"a"), Some(1));
    /// assert_eq!(cache.get(&"b"), None);
    /// ```
    pub fn get(&self, key: &K) -> C::Lookup {
        self.partition_for(key).get(key)
    }

    /// Asynchronous [`get`](Self::get) for partitions that support it.
    pub fn get_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, C::Lookup>
    where
        C: AsyncCache<K, V>,
    {
        self.partition_for(key).get_async(key)
    }

    /// Inserts into the partition that owns `key`. Only that partition can
    /// collect as a result.
    pub fn insert(&self, key: K, value: V) {
        self.partition_for(&key).insert(key, value);
    }

    /// Removes `key` from the partition that owns it.
    pub fn remove(&self, key: &K) -> Option<C::Entry> {
        self.partition_for(key).remove(key)
    }

    /// Clears every partition. Partitions are cleared one after another,
    /// not atomically.
    pub fn clear(&self) {
        self.partitions.iter().for_each(|partition| partition.clear());
    }

    /// Sum of every partition's length.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|partition| partition.len()).sum()
    }

    /// Returns `true` if no partition holds an entry.
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|partition| partition.is_empty())
    }

    /// Length of each partition, in routing order.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::config::CacheConfig;
    /// use gencache::policy::partitioned::PartitionedCache;
    ///
    /// let cache = PartitionedCache::direct(CacheConfig::with_gen0_limit(64), Some(4)).unwrap();
    /// for key in 0..100_u32 {
    ///     cache.insert(key, key);
    /// }
    ///
    /// let lengths = cache.partition_lengths();
    /// assert_eq!(lengths.len(), 4);
    /// assert_eq!(lengths.iter().sum::<usize>(), cache.len());
    /// ```
    pub fn partition_lengths(&self) -> Vec<usize> {
        self.partitions.iter().map(|partition| partition.len()).collect()
    }

    /// Collects every partition once; returns the total number evicted.
    pub fn force_collect(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.force_collect())
            .sum()
    }

    /// Registers `listener` on every partition.
    ///
    /// Partitions collect independently, so the listener may run on several
    /// threads at once. The [`CacheId`](crate::policy::events::CacheId)
    /// passed with each batch names the partition that evicted it.
    pub fn subscribe(&self, listener: EvictionListener<K, C::Entry>) {
        for partition in self.partitions.iter() {
            partition.subscribe(listener.clone());
        }
    }

    /// Metrics summed over all partitions.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.partitions
            .iter()
            .map(|partition| partition.metrics())
            .fold(CacheMetricsSnapshot::default(), CacheMetricsSnapshot::merge)
    }
}

impl<K, V, C> CoreCache<K, V> for PartitionedCache<K, V, C>
where
    K: Hash,
    C: CoreCache<K, V>,
{
    type Entry = C::Entry;
    type Lookup = C::Lookup;

    fn get(&self, key: &K) -> C::Lookup {
        PartitionedCache::get(self, key)
    }

    fn insert(&self, key: K, value: V) {
        PartitionedCache::insert(self, key, value);
    }

    fn remove(&self, key: &K) -> Option<C::Entry> {
        PartitionedCache::remove(self, key)
    }

    fn clear(&self) {
        PartitionedCache::clear(self);
    }

    fn len(&self) -> usize {
        PartitionedCache::len(self)
    }

    fn is_empty(&self) -> bool {
        PartitionedCache::is_empty(self)
    }

    fn force_collect(&self) -> usize {
        PartitionedCache::force_collect(self)
    }

    fn subscribe(&self, listener: EvictionListener<K, C::Entry>) {
        PartitionedCache::subscribe(self, listener);
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        PartitionedCache::metrics(self)
    }
}

impl<K, V, C> AsyncCache<K, V> for PartitionedCache<K, V, C>
where
    K: Hash,
    C: AsyncCache<K, V>,
{
    fn get_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, C::Lookup> {
        PartitionedCache::get_async(self, key)
    }
}

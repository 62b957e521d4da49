//! Fluent construction of every cache flavor.
//!
//! Collects the size limit, time-to-live and partition count, validates
//! them once, and builds the requested cache.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use gencache::builder::CacheBuilder;
//!
//! let cache = CacheBuilder::new()
//!     .gen0_limit(10_000)
//!     .time_to_live(Duration::from_secs(60))
//!     .build_direct::<u64, String>()
//!     .unwrap();
//! cache.insert(1, "hello".to_string());
//! assert_eq!(cache.get(&1), Some("hello".to_string()));
//! ```
//!
//! | Method                               | Builds                                         |
//! |--------------------------------------|------------------------------------------------|
//! | `build_direct`                       | `DirectCache<K, V>`                            |
//! | `build_read_through(source)`         | `ReadThroughCache<K, V, S>`                    |
//! | `build_herd_guarded(source)`         | `ReadThroughCache<K, V, ThunderingHerdGuard>`  |
//! | `build_partitioned_direct`           | `PartitionedCache<K, V>`                       |
//! | `build_partitioned_read_through(s)`  | `PartitionedCache<K, V, ReadThroughCache<..>>` |
//! | `build_partitioned_herd_guarded(s)`  | partitions sharing one herd guard              |

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::policy::direct::DirectCache;
use crate::policy::partitioned::PartitionedCache;
use crate::policy::read_through::ReadThroughCache;
use crate::source::herd::ThunderingHerdGuard;
use crate::traits::DataSource;

/// Read-through cache whose source is wrapped in a herd guard.
pub type HerdGuardedCache<K, V, S> = ReadThroughCache<K, V, ThunderingHerdGuard<K, V, S>>;

/// Partitioned read-through cache whose partitions share one herd guard.
pub type PartitionedHerdGuardedCache<K, V, S> =
    PartitionedCache<K, V, ReadThroughCache<K, V, Arc<ThunderingHerdGuard<K, V, S>>>>;

/// Builder for all cache flavors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheBuilder {
    gen0_limit: Option<usize>,
    time_to_live: Option<Duration>,
    partitions: Option<usize>,
}

impl CacheBuilder {
    /// Starts with no size limit, no time-to-live and the default partition
    /// count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            gen0_limit: config.gen0_limit.map(NonZeroUsize::get),
            time_to_live: config.time_to_live,
            partitions: None,
        }
    }

    /// Maximum number of entries in gen0 before a collection runs.
    pub fn gen0_limit(mut self, limit: usize) -> Self {
        self.gen0_limit = Some(limit);
        self
    }

    /// Interval of the background sweep.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Partition count for partitioned caches; ignored by the others.
    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Validates the collected settings.
    pub fn try_config(&self) -> Result<CacheConfig, ConfigError> {
        if self.partitions == Some(0) {
            return Err(ConfigError::new("partition count must be at least 1"));
        }
        let gen0_limit = match self.gen0_limit {
            Some(limit) => Some(
                NonZeroUsize::new(limit)
                    .ok_or_else(|| ConfigError::new("gen0_limit must be greater than zero"))?,
            ),
            None => None,
        };
        let config = CacheConfig {
            gen0_limit,
            time_to_live: self.time_to_live,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn build_direct<K, V>(&self) -> Result<DirectCache<K, V>, ConfigError>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        Ok(DirectCache::new(self.try_config()?))
    }

    pub fn build_read_through<K, V, S>(
        &self,
        source: S,
    ) -> Result<ReadThroughCache<K, V, S>, ConfigError>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: DataSource<K, V>,
    {
        Ok(ReadThroughCache::new(self.try_config()?, source))
    }

    /// Read-through cache that collapses concurrent loads of one key.
    pub fn build_herd_guarded<K, V, S>(
        &self,
        source: S,
    ) -> Result<HerdGuardedCache<K, V, S>, ConfigError>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: DataSource<K, V>,
    {
        Ok(ReadThroughCache::new(
            self.try_config()?,
            ThunderingHerdGuard::new(source),
        ))
    }

    pub fn build_partitioned_direct<K, V>(&self) -> Result<PartitionedCache<K, V>, ConfigError>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        PartitionedCache::direct(self.try_config()?, self.partitions)
    }

    pub fn build_partitioned_read_through<K, V, S>(
        &self,
        source: S,
    ) -> Result<PartitionedCache<K, V, ReadThroughCache<K, V, S>>, ConfigError>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: DataSource<K, V> + Clone,
    {
        PartitionedCache::read_through(self.try_config()?, self.partitions, source)
    }

    /// Partitioned read-through cache; all partitions share one herd guard.
    pub fn build_partitioned_herd_guarded<K, V, S>(
        &self,
        source: S,
    ) -> Result<PartitionedHerdGuardedCache<K, V, S>, ConfigError>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: DataSource<K, V>,
    {
        let guard = Arc::new(ThunderingHerdGuard::new(source));
        PartitionedCache::read_through(self.try_config()?, self.partitions, guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::source::FnSource;

    fn doubling() -> impl DataSource<u32, u32> + Clone {
        FnSource::new(|key: &u32| -> Result<Option<u32>, std::io::Error> { Ok(Some(key * 2)) })
    }

    #[test]
    fn defaults_are_unbounded() {
        let config = CacheBuilder::new().try_config().unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn settings_reach_the_config() {
        let config = CacheBuilder::new()
            .gen0_limit(64)
            .time_to_live(Duration::from_secs(5))
            .try_config()
            .unwrap();
        assert_eq!(config.gen0_limit, NonZeroUsize::new(64));
        assert_eq!(config.time_to_live, Some(Duration::from_secs(5)));
        assert_eq!(CacheBuilder::from_config(config).try_config().unwrap(), config);
    }

    #[test]
    fn zero_values_are_rejected() {
        let err = CacheBuilder::new().gen0_limit(0).try_config().unwrap_err();
        assert!(err.message().contains("gen0_limit"));

        let err = CacheBuilder::new().time_to_live(Duration::ZERO).try_config().unwrap_err();
        assert!(err.message().contains("time_to_live"));

        let err = CacheBuilder::new().partitions(0).try_config().unwrap_err();
        assert!(err.message().contains("partition"));
        assert!(CacheBuilder::new().partitions(0).build_direct::<u32, u32>().is_err());
    }

    #[test]
    fn builds_every_flavor() {
        let builder = CacheBuilder::new().gen0_limit(100).partitions(4);

        let direct = builder.build_direct::<u32, u32>().unwrap();
        direct.insert(1, 1);
        assert_eq!(direct.get(&1), Some(1));

        let read_through = builder.build_read_through::<u32, u32, _>(doubling()).unwrap();
        assert_eq!(read_through.get(&3).unwrap(), Some(6));

        let guarded = builder.build_herd_guarded::<u32, u32, _>(doubling()).unwrap();
        assert_eq!(guarded.get(&4).unwrap(), Some(8));
        assert_eq!(guarded.source().in_flight(), 0);

        let partitioned = builder.build_partitioned_direct::<u32, u32>().unwrap();
        assert_eq!(partitioned.partition_count(), 4);
        assert_eq!(partitioned.partition(0).unwrap().config().gen0_limit, NonZeroUsize::new(25));

        let partitioned = builder
            .build_partitioned_read_through::<u32, u32, _>(doubling()).unwrap();
        assert_eq!(partitioned.get(&5).unwrap(), Some(10));

        let partitioned = builder
            .build_partitioned_herd_guarded::<u32, u32, _>(doubling()).unwrap();
        assert_eq!(partitioned.get(&6).unwrap(), Some(12));
        assert_eq!(partitioned.partition_count(), 4);
    }
}

//! Cache configuration.
//!
//! | Field          | Type                    | Default | Description                               |
//! |----------------|-------------------------|---------|-------------------------------------------|
//! | `gen0_limit`   | `Option<NonZeroUsize>`  | `None`  | Size of gen0 that triggers a collection   |
//! | `time_to_live` | `Option<Duration>`      | `None`  | Interval of the background sweep          |
//!
//! Both limits are optional: a cache with neither set grows without bound and
//! only collects when [`force_collect`](crate::traits::CoreCache::force_collect)
//! is called.
//!
//! With the `serde` feature enabled, [`CacheConfig`] can be loaded from any
//! serde format:
//!
//! ```
//! # #[cfg(feature = "serde")]
//! # {
//! use gencache::config::CacheConfig;
//!
//! let config: CacheConfig =
//!     serde_json::from_str(r#"{"gen0_limit": 1024, "time_to_live": {"secs": 60, "nanos": 0}}"#)
//!         .unwrap();
//! assert_eq!(config.gen0_limit.map(|n| n.get()), Some(1024));
//! # }
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::error::ConfigError;

/// Size and age bounds for a generational cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Number of gen0 entries at which the next insert of a new key first
    /// runs a collection. `None` leaves the cache unbounded by size.
    pub gen0_limit: Option<NonZeroUsize>,
    /// Interval of the periodic sweep. `None` disables the sweep.
    ///
    /// An entry that is never read survives at most two sweeps, so its
    /// worst-case age is `2 × time_to_live`.
    pub time_to_live: Option<Duration>,
}

impl CacheConfig {
    /// Creates a config with no size or age bound.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Creates a config bounded by gen0 size only.
    ///
    /// A `limit` of 0 yields an unbounded config.
    pub fn with_gen0_limit(limit: usize) -> Self {
        Self {
            gen0_limit: NonZeroUsize::new(limit),
            time_to_live: None,
        }
    }

    /// Checks values that the type system cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_to_live.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::new("time_to_live must be greater than zero"));
        }
        Ok(())
    }

    /// Returns the config each of `partitions` shards should use.
    ///
    /// The gen0 limit is split with integer division so the aggregate bound
    /// never exceeds the configured one. A limit smaller than the partition
    /// count still gives every shard a limit of 1.
    pub fn per_partition(&self, partitions: NonZeroUsize) -> Self {
        Self {
            gen0_limit: self.gen0_limit.map(|limit| {
                NonZeroUsize::new(limit.get() / partitions.get()).unwrap_or(NonZeroUsize::MIN)
            }),
            time_to_live: self.time_to_live,
        }
    }
}

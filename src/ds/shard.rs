//! Deterministic key-to-partition routing.
//!
//! Used by [`PartitionedCache`](crate::policy::partitioned::PartitionedCache)
//! to pick the one partition that owns a key.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     Partition Selection Flow                        │
//! │                                                                     │
//! │   Input Key                                                         │
//! │       │                                                             │
//! │       ▼                                                             │
//! │   ┌─────────────────────────────────────────────────────────────┐   │
//! │   │  PartitionSelector { partitions: 4, seed: 0 }               │   │
//! │   │                                                             │   │
//! │   │  1. Hash seed, then key, with DefaultHasher → u64           │   │
//! │   │  2. partitions is a power of two? hash & (partitions - 1)   │   │
//! │   │     otherwise:                    hash % partitions         │   │
//! │   └─────────────────────────────────────────────────────────────┘   │
//! │       │                                                             │
//! │       ▼                                                             │
//! │   Partition Index: 0, 1, 2, or 3                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hash is unsigned, so the index is always in `[0, partitions)`. The
//! mask and modulo forms agree for power-of-two counts; the mask only
//! skips a division.
//!
//! ## Example Usage
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use gencache::ds::PartitionSelector;
//!
//! let selector = PartitionSelector::new(NonZeroUsize::new(4).unwrap(), 0);
//!
//! let index = selector.partition_for_key(&"user:123");
//! assert!(index < 4);
//! assert_eq!(selector.partition_for_key(&"user:123"), index);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

/// Deterministic partition selector using a seeded hash.
///
/// The same `(key, seed, partitions)` always produces the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSelector {
    partitions: NonZeroUsize,
    seed: u64,
    mask: Option<u64>,
}

impl PartitionSelector {
    pub fn new(partitions: NonZeroUsize, seed: u64) -> Self {
        let mask = partitions
            .is_power_of_two()
            .then(|| partitions.get() as u64 - 1);
        Self {
            partitions,
            seed,
            mask,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.get()
    }

    /// Seeded hash of `key`.
    pub fn hash<K: Hash + ?Sized>(&self, key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Maps a precomputed hash to a partition index.
    #[inline]
    pub fn index_for_hash(&self, hash: u64) -> usize {
        match self.mask {
            Some(mask) => (hash & mask) as usize,
            None => (hash % self.partitions.get() as u64) as usize,
        }
    }

    /// Maps a key to a partition index in `[0, partitions)`.
    pub fn partition_for_key<K: Hash + ?Sized>(&self, key: &K) -> usize {
        self.index_for_hash(self.hash(key))
    }
}

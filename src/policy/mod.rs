//! Generational cache policies.
//!
//! - [`generational`]: the two-generation store and its lock guard.
//! - [`direct`]: caller-populated cache.
//! - [`read_through`]: cache that loads misses from a data source.
//! - [`partitioned`]: any of the above split across hash partitions.
//! - [`events`]: eviction batches and listeners.
//! - [`sweep`]: background time-to-live collection.

pub mod direct;
pub mod events;
pub mod generational;
pub mod partitioned;
pub mod read_through;
pub mod sweep;

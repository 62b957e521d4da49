//! Cache metrics.
//!
//! Counters are recorded with relaxed atomics on every cache operation and
//! read through [`CacheMetricsSnapshot`]. Generation gauges (`gen0_len`,
//! `gen1_len`) and the collection/eviction totals are captured under the
//! cache lock at snapshot time.

pub mod counters;
pub mod snapshot;

pub use counters::CacheCounters;
pub use snapshot::CacheMetricsSnapshot;

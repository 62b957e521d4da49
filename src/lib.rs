//! gencache: generational read-through caches with thundering-herd
//! protection and hash partitioning.
//!
//! ```text
//!   client ──▶ PartitionedCache ──▶ ReadThroughCache ──▶ ThunderingHerdGuard ──▶ DataSource
//!              (route by hash)      (gen0 / gen1)        (one load per key)
//! ```
//!
//! Entries live in two generations. New entries go to gen0; a collection
//! discards gen1 and ages gen0 into it. Reading a gen1 entry promotes it
//! back to gen0, so an entry that is read at least once per collection
//! cycle is never evicted. Collections run when gen0 reaches its limit and,
//! with a time-to-live configured, on a background sweep.
//!
//! Start with [`builder::CacheBuilder`] or the [`prelude`].

pub mod builder;
pub mod config;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod source;
pub mod traits;

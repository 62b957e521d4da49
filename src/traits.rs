//! # Cache Trait Hierarchy
//!
//! This module defines the two seams of the crate: the capability every
//! generational cache exposes, and the capability a read-through cache
//! requires of its backing store.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────┐
//!   │            CoreCache<K, V>               │
//!   │                                          │
//!   │  get(&, &K) → Lookup                     │
//!   │  insert(&, K, V)                         │
//!   │  remove(&, &K) → Option<Entry>           │
//!   │  clear / len / is_empty                  │
//!   │  force_collect(&) → usize                │
//!   │  subscribe(EvictionListener)             │
//!   │  metrics(&) → CacheMetricsSnapshot       │
//!   └────────────────────┬─────────────────────┘
//!                        │
//!                        ▼
//!   ┌──────────────────────────────────────────┐
//!   │            AsyncCache<K, V>              │
//!   │  get_async(&, &K) → BoxFuture<Lookup>    │
//!   └──────────────────────────────────────────┘
//!
//!   ┌──────────────────────────────────────────┐
//!   │            DataSource<K, V>              │
//!   │  load(&, &K) → Result<Option<V>, Error>  │
//!   │  load_async(&, &K) → BoxFuture<…>        │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! ## Trait Summary
//!
//! | Trait         | Implemented by                                           |
//! |---------------|----------------------------------------------------------|
//! | `CoreCache`   | `DirectCache`, `ReadThroughCache`, `PartitionedCache`    |
//! | `AsyncCache`  | `DirectCache`, `ReadThroughCache`, `PartitionedCache<C: AsyncCache>` |
//! | `DataSource`  | user backends, `Arc<S>`, `&S`, `FnSource`, `ThunderingHerdGuard` |
//!
//! ## Lookups and Entries
//!
//! `Entry` is the type a cache stores per key and hands to eviction
//! listeners. `Lookup` is what `get` returns:
//!
//! | Cache                    | `Entry`      | `Lookup`                         |
//! |--------------------------|--------------|----------------------------------|
//! | `DirectCache<K, V>`      | `V`          | `Option<V>`                      |
//! | `ReadThroughCache<K,V,S>`| `Option<V>`  | `Result<Option<V>, S::Error>`    |
//!
//! A read-through cache stores `None` for keys its source reported as
//! missing, so repeated misses are answered from memory until evicted.
//!
//! ## Thread Safety
//!
//! All cache methods take `&self`; every implementation synchronizes
//! internally and is `Send + Sync`.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::metrics::CacheMetricsSnapshot;
use crate::policy::events::EvictionListener;

/// Operations shared by every generational cache.
pub trait CoreCache<K, V>: Send + Sync {
    /// Value stored per key and delivered in eviction batches.
    type Entry;

    /// Result of [`get`](Self::get).
    type Lookup;

    /// Looks up `key`, promoting it out of gen1 when found there.
    fn get(&self, key: &K) -> Self::Lookup;

    /// Inserts or overwrites `key`.
    ///
    /// Overwriting a resident key keeps it in its current generation.
    fn insert(&self, key: K, value: V);

    /// Removes `key` from whichever generation holds it.
    fn remove(&self, key: &K) -> Option<Self::Entry>;

    /// Drops every entry without notifying eviction listeners.
    fn clear(&self);

    /// Number of entries across both generations.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs one collection regardless of size and returns the number of
    /// entries evicted.
    fn force_collect(&self) -> usize;

    /// Registers a listener for eviction batches.
    fn subscribe(&self, listener: EvictionListener<K, Self::Entry>);

    fn metrics(&self) -> CacheMetricsSnapshot;
}

/// Caches whose lookups can be awaited.
pub trait AsyncCache<K, V>: CoreCache<K, V> {
    fn get_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Self::Lookup>;
}

/// A backing store consulted by read-through caches on a miss.
///
/// `Ok(None)` is the "not found" answer and is memoized by the cache; an
/// `Err` is returned to the caller and never cached.
pub trait DataSource<K, V>: Send + Sync
where
    V: Send + 'static,
{
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads `key`, blocking the calling thread.
    fn load(&self, key: &K) -> Result<Option<V>, Self::Error>;

    /// Loads `key` asynchronously.
    ///
    /// The default runs [`load`](Self::load) inline on the polling thread;
    /// sources with a native async client should override it.
    fn load_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<Option<V>, Self::Error>> {
        futures::future::ready(self.load(key)).boxed()
    }
}

impl<K, V, S> DataSource<K, V> for Arc<S>
where
    V: Send + 'static,
    S: DataSource<K, V> + ?Sized,
{
    type Error = S::Error;

    fn load(&self, key: &K) -> Result<Option<V>, Self::Error> {
        (**self).load(key)
    }

    fn load_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<Option<V>, Self::Error>> {
        (**self).load_async(key)
    }
}

impl<K, V, S> DataSource<K, V> for &S
where
    V: Send + 'static,
    S: DataSource<K, V> + ?Sized,
{
    type Error = S::Error;

    fn load(&self, key: &K) -> Result<Option<V>, Self::Error> {
        (**self).load(key)
    }

    fn load_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<Option<V>, Self::Error>> {
        (**self).load_async(key)
    }
}

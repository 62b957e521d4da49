//! Two-generation storage shared by every cache in the crate.
//!
//! ## Architecture
//!
//! ```text
//!   insert(new key)                 get(key in gen1)
//!        │                                │ promote
//!        ▼                                ▼
//!   ┌──────────┐   collection    ┌──────────┐   collection    ┌────────────────┐
//!   │   gen0   │ ──────────────▶ │   gen1   │ ──────────────▶ │ EvictionBatch  │
//!   │ (active) │  gen1 := gen0   │ (aging)  │  old gen1 out   │ → listeners    │
//!   └──────────┘  gen0 := {}     └──────────┘                 └────────────────┘
//! ```
//!
//! A collection runs before inserting a new key once gen0 holds
//! `gen0_limit` entries, or whenever the owning cache forces one (periodic
//! sweep, explicit call). An entry that is never read again survives exactly
//! one collection. Reading an entry in gen1 moves it back to gen0, which buys
//! it another collection.
//!
//! ## Key Components
//!
//! - [`Generations`]: the unsynchronized state machine. Callers must hold the
//!   owning cache's lock for every call.
//! - [`GenerationalCore`]: the lock, listener registry and counters around a
//!   `Generations`.
//! - [`CacheGuard`]: RAII lock handle for batches of operations.
//! - [`Version`]: bumped once per newly inserted key, compared for equality
//!   by read-through caches to detect inserts that raced an unlocked load.
//!
//! ## Invariants
//!
//! - A key is resident in at most one generation.
//! - `len() == gen0_len() + gen1_len()`.
//! - Promotion and in-place updates never bump the version.
//! - Generation maps are replaced on collection, never cleared in place.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::error::InvariantError;
use crate::metrics::{CacheCounters, CacheMetricsSnapshot};
use crate::policy::events::{CacheId, EvictionBatch, EvictionListener, EvictionListeners};

/// Insert counter used for optimistic concurrency.
///
/// Wraps on overflow; only equality is meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version(u32);

impl Version {
    #[inline]
    fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// What an insert did to the generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The key was resident and its value was replaced in place.
    Updated,
    /// The key was new and now lives in gen0.
    Inserted,
}

/// Gen0/gen1 maps plus the collection trigger.
pub struct Generations<K, T> {
    gen0: FxHashMap<K, T>,
    gen1: FxHashMap<K, T>,
    gen0_limit: Option<NonZeroUsize>,
    version: Version,
    collections: u64,
    evicted: u64,
}

impl<K, T> fmt::Debug for Generations<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generations")
            .field("gen0_len", &self.gen0.len())
            .field("gen1_len", &self.gen1.len())
            .field("gen0_limit", &self.gen0_limit)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<K, T> Generations<K, T>
where
    K: Eq + Hash,
{
    pub fn new(gen0_limit: Option<NonZeroUsize>) -> Self {
        Self {
            gen0: FxHashMap::default(),
            gen1: FxHashMap::default(),
            gen0_limit,
            version: Version::default(),
            collections: 0,
            evicted: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.gen0.len() + self.gen1.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn gen0_len(&self) -> usize {
        self.gen0.len()
    }

    pub fn gen1_len(&self) -> usize {
        self.gen1.len()
    }

    pub fn gen0_limit(&self) -> Option<NonZeroUsize> {
        self.gen0_limit
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Number of collections run so far.
    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Number of entries discarded by collections so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Looks up `key`, moving it from gen1 to gen0 if it is found there.
    pub fn get(&mut self, key: &K) -> Option<&T> {
        if !self.gen0.contains_key(key) {
            let (key, value) = self.gen1.remove_entry(key)?;
            self.gen0.insert(key, value);
        }
        self.gen0.get(key)
    }

    /// Looks up `key` without promoting it.
    pub fn peek(&self, key: &K) -> Option<&T> {
        self.gen0.get(key).or_else(|| self.gen1.get(key))
    }

    /// Returns `true` if `key` is resident in either generation.
    pub fn contains(&self, key: &K) -> bool {
        self.gen0.contains_key(key) || self.gen1.contains_key(key)
    }

    /// Returns `true` if `key` is resident in gen0.
    pub fn in_gen0(&self, key: &K) -> bool {
        self.gen0.contains_key(key)
    }

    /// Returns `true` if `key` is resident in gen1.
    pub fn in_gen1(&self, key: &K) -> bool {
        self.gen1.contains_key(key)
    }

    /// Inserts or overwrites `key`.
    ///
    /// A resident key is updated in place. A new key may first trigger a
    /// collection, whose evicted batch is returned alongside the outcome.
    pub fn insert(&mut self, key: K, value: T) -> (Insertion, Option<EvictionBatch<K, T>>) {
        if let Some(slot) = self.gen0.get_mut(&key) {
            *slot = value;
            return (Insertion::Updated, None);
        }
        if let Some(slot) = self.gen1.get_mut(&key) {
            *slot = value;
            return (Insertion::Updated, None);
        }

        let evicted = self.maybe_collect_before_insert();
        self.gen0.insert(key, value);
        self.version.bump();
        (Insertion::Inserted, evicted)
    }

    /// Removes `key` from whichever generation holds it.
    pub fn remove(&mut self, key: &K) -> Option<T> {
        self.gen0.remove(key).or_else(|| self.gen1.remove(key))
    }

    /// Drops both generations without producing an eviction batch.
    pub fn clear(&mut self) {
        self.gen0 = FxHashMap::default();
        self.gen1 = FxHashMap::default();
    }

    /// Runs a collection if gen0 has reached its limit.
    pub fn maybe_collect_before_insert(&mut self) -> Option<EvictionBatch<K, T>> {
        match self.gen0_limit {
            Some(limit) if self.gen0.len() >= limit.get() => self.force_collect(),
            _ => None,
        }
    }

    /// Discards gen1, ages gen0 into gen1, and starts an empty gen0.
    ///
    /// Returns the discarded gen1 if it held anything.
    pub fn force_collect(&mut self) -> Option<EvictionBatch<K, T>> {
        let aged = std::mem::take(&mut self.gen0);
        let discarded = std::mem::replace(&mut self.gen1, aged);
        self.collections += 1;
        if discarded.is_empty() {
            return None;
        }
        self.evicted += discarded.len() as u64;
        Some(EvictionBatch::new(discarded))
    }

    /// Copies both generations into one map without promoting anything.
    pub fn snapshot(&self) -> FxHashMap<K, T>
    where
        K: Clone,
        T: Clone,
    {
        let mut merged = FxHashMap::with_capacity_and_hasher(self.len(), Default::default());
        merged.extend(self.gen1.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(self.gen0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Verifies that no key is resident in both generations.
    pub fn check_invariants(&self) -> Result<(), InvariantError>
    where
        K: fmt::Debug,
    {
        let (smaller, larger) = if self.gen0.len() <= self.gen1.len() {
            (&self.gen0, &self.gen1)
        } else {
            (&self.gen1, &self.gen0)
        };
        if let Some(key) = smaller.keys().find(|key| larger.contains_key(*key)) {
            return Err(InvariantError::new(format!(
                "key {:?} resident in both generations",
                key
            )));
        }
        Ok(())
    }
}

/// Lock, listeners and counters around a [`Generations`].
///
/// Eviction batches are always dispatched after the lock is released.
pub struct GenerationalCore<K, T> {
    id: CacheId,
    state: Mutex<Generations<K, T>>,
    listeners: EvictionListeners<K, T>,
    counters: CacheCounters,
}

impl<K, T> fmt::Debug for GenerationalCore<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationalCore")
            .field("id", &self.id)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl<K, T> GenerationalCore<K, T>
where
    K: Eq + Hash,
{
    pub fn new(gen0_limit: Option<NonZeroUsize>) -> Self {
        Self {
            id: CacheId::next(),
            state: Mutex::new(Generations::new(gen0_limit)),
            listeners: EvictionListeners::default(),
            counters: CacheCounters::default(),
        }
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    pub fn subscribe(&self, listener: EvictionListener<K, T>) {
        self.listeners.subscribe(listener);
    }

    /// Acquires the cache lock.
    pub fn lock(&self) -> CacheGuard<'_, K, T> {
        CacheGuard {
            state: self.state.lock(),
            pending: PendingEvictions {
                core: self,
                batches: Vec::new(),
            },
        }
    }

    /// Looks up `key` with promotion and records a hit or miss.
    pub fn get_cloned(&self, key: &K) -> Option<T>
    where
        T: Clone,
    {
        let found = self.state.lock().get(key).cloned();
        match found {
            Some(_) => self.counters.inc_hit(),
            None => self.counters.inc_miss(),
        }
        found
    }

    pub fn peek_cloned(&self, key: &K) -> Option<T>
    where
        T: Clone,
    {
        self.state.lock().peek(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().contains(key)
    }

    pub fn insert(&self, key: K, value: T) -> Insertion {
        self.lock().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<T> {
        self.lock().remove(key)
    }

    pub fn clear(&self) {
        self.state.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn force_collect(&self) -> usize {
        self.lock().force_collect()
    }

    pub fn snapshot(&self) -> FxHashMap<K, T>
    where
        K: Clone,
        T: Clone,
    {
        self.state.lock().snapshot()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        let mut snapshot = self.counters.snapshot();
        let state = self.state.lock();
        snapshot.collections = state.collections();
        snapshot.evicted_entries = state.evicted();
        snapshot.gen0_len = state.gen0_len();
        snapshot.gen1_len = state.gen1_len();
        snapshot
    }

    fn dispatch(&self, batch: EvictionBatch<K, T>) {
        debug!("{}: collection evicted {} entries", self.id, batch.len());
        self.listeners.notify(self.id, &batch);
    }
}

/// Exclusive lock on one cache's generations.
///
/// Every operation applied through the guard is atomic with respect to all
/// other operations on the cache. Eviction batches produced while the guard
/// is held are delivered to listeners after it drops and the lock is
/// released.
///
/// Do not call methods of the same cache while holding its guard from the
/// same thread; the lock is not re-entrant.
pub struct CacheGuard<'a, K, T>
where
    K: Eq + Hash,
{
    // Field order matters: the lock is released before pending batches are
    // dispatched.
    state: MutexGuard<'a, Generations<K, T>>,
    pending: PendingEvictions<'a, K, T>,
}

impl<K, T> CacheGuard<'_, K, T>
where
    K: Eq + Hash,
{
    /// Looks up `key`, promoting it out of gen1. Does not touch metrics.
    pub fn get(&mut self, key: &K) -> Option<&T> {
        let promoted = self.state.in_gen1(key);
        if promoted {
            trace!("{}: promoting entry from gen1", self.pending.core.id);
        }
        self.state.get(key)
    }

    pub fn peek(&self, key: &K) -> Option<&T> {
        self.state.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.contains(key)
    }

    pub fn insert(&mut self, key: K, value: T) -> Insertion {
        let (insertion, evicted) = self.state.insert(key, value);
        match insertion {
            Insertion::Inserted => self.pending.core.counters.inc_insert(),
            Insertion::Updated => self.pending.core.counters.inc_update(),
        }
        self.pending.batches.extend(evicted);
        insertion
    }

    pub fn remove(&mut self, key: &K) -> Option<T> {
        let removed = self.state.remove(key);
        if removed.is_some() {
            self.pending.core.counters.inc_remove();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Runs a collection and returns the number of entries it evicted.
    pub fn force_collect(&mut self) -> usize {
        match self.state.force_collect() {
            Some(batch) => {
                let evicted = batch.len();
                self.pending.batches.push(batch);
                evicted
            },
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn version(&self) -> Version {
        self.state.version()
    }

    /// Read access to the underlying generations.
    pub fn generations(&self) -> &Generations<K, T> {
        &self.state
    }
}

struct PendingEvictions<'a, K, T>
where
    K: Eq + Hash,
{
    core: &'a GenerationalCore<K, T>,
    batches: Vec<EvictionBatch<K, T>>,
}

impl<K, T> Drop for PendingEvictions<'_, K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        for batch in self.batches.drain(..) {
            self.core.dispatch(batch);
        }
    }
}

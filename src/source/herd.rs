//! Request coalescing for data sources.
//!
//! ## Architecture
//!
//! ```text
//!   caller A ──┐                      ┌──────────────────────────────────┐
//!   caller B ──┼── attach(key) ─────▶ │ in-flight table                  │
//!   caller C ──┘                      │   key ─▶ (Episode, WeakShared?)  │
//!                                     └───────────────┬──────────────────┘
//!                                                     │ first caller only
//!                          ┌──────────────────────────┴───────────────┐
//!                          ▼ blocking                                 ▼ async
//!              source.load(key) on the             Shared<source.load_async(key)>
//!              caller's own thread
//!                          │                                          │
//!                          └───────────▶ Episode::publish ◀───────────┘
//!                                      (condvar + oneshot subscribers)
//! ```
//!
//! The first caller for a key starts an *episode* that calls the wrapped
//! source once. Callers arriving while the episode is in flight attach to it
//! and receive the same outcome, value or error. The record is removed from
//! the table when the load finishes, so the next caller starts a fresh
//! episode.
//!
//! An async episode is a shared future and the table holds only a weak
//! handle to it. If every async caller of an episode is dropped (cancelled,
//! say) the load future is dropped with them and the record is cleared. A
//! caller that cancels while others still wait does not disturb them.
//!
//! ## Errors
//!
//! Errors are wrapped in [`SharedError`] so that one failure can be handed
//! to every waiter. All waiters of one episode receive clones of the same
//! error; [`SharedError::ptr_eq`] tells them apart from a later failure.
//!
//! ## Blocking Callers
//!
//! [`DataSource::load`] never runs an executor. A blocking caller that
//! starts an episode calls the wrapped source's `load` on its own thread; a
//! blocking caller that joins one parks on the episode's condvar until the
//! outcome is published. Calling it from inside an async runtime is
//! therefore as safe as calling the wrapped source directly.
//!
//! Blocking and async callers of the same key join the same episode,
//! whichever kind started it. Async callers joining a blocking episode
//! subscribe to its outcome. Blocking callers joining an async episode do
//! not keep its load alive: if every async caller goes away first, the
//! episode is abandoned and the blocking callers start a new one.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use gencache::config::CacheConfig;
//! use gencache::policy::read_through::ReadThroughCache;
//! use gencache::source::FnSource;
//! use gencache::source::herd::ThunderingHerdGuard;
//!
//! let backend = FnSource::new(|key: &u32| -> Result<Option<u32>, std::io::Error> {
//!     Ok(Some(key * 2))
//! });
//! let guarded = ThunderingHerdGuard::new(backend);
//! let cache: ReadThroughCache<u32, u32, _> =
//!     ReadThroughCache::new(CacheConfig::with_gen0_limit(1024), guarded);
//!
//! assert_eq!(cache.get(&21).unwrap(), Some(42));
//! assert_eq!(cache.source().in_flight(), 0);
//! ```

use std::fmt;
use std::hash::Hash;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared, WeakShared};
use log::trace;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::error::SharedError;
use crate::traits::DataSource;

type LoadOutcome<V, E> = Result<Option<V>, SharedError<E>>;
type LoadFuture<V, E> = BoxFuture<'static, LoadOutcome<V, E>>;
type InFlightTable<K, V, E> = Mutex<FxHashMap<K, InFlightLoad<V, E>>>;

struct InFlightLoad<V, E> {
    episode: Arc<Episode<V, E>>,
    /// Set for episodes started by an async caller.
    load: Option<WeakShared<LoadFuture<V, E>>>,
}

enum Settlement<V, E> {
    Pending(Vec<oneshot::Sender<LoadOutcome<V, E>>>),
    Done(LoadOutcome<V, E>),
    Abandoned,
}

/// One load of one key and everyone waiting on it.
struct Episode<V, E> {
    id: u64,
    settlement: Mutex<Settlement<V, E>>,
    settled: Condvar,
    waiters: AtomicUsize,
}

impl<V, E> Episode<V, E> {
    fn new(id: u64) -> Self {
        Self {
            id,
            settlement: Mutex::new(Settlement::Pending(Vec::new())),
            settled: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Ends an episode that never published. Waiters start over.
    fn abandon(&self) {
        let subscribers = {
            let mut settlement = self.settlement.lock();
            if !matches!(*settlement, Settlement::Pending(_)) {
                return;
            }
            mem::replace(&mut *settlement, Settlement::Abandoned)
        };
        self.settled.notify_all();
        // Dropping the senders cancels every async subscriber.
        drop(subscribers);
        trace!("load episode {} abandoned", self.id);
    }
}

impl<V, E> Episode<V, E>
where
    V: Clone,
{
    fn publish(&self, outcome: &LoadOutcome<V, E>) {
        let previous = mem::replace(
            &mut *self.settlement.lock(),
            Settlement::Done(outcome.clone()),
        );
        self.settled.notify_all();
        if let Settlement::Pending(subscribers) = previous {
            for subscriber in subscribers {
                let _ = subscriber.send(outcome.clone());
            }
        }
    }

    /// Parks the calling thread until the episode settles. `None` means it
    /// was abandoned.
    fn wait(&self) -> Option<LoadOutcome<V, E>> {
        let mut settlement = self.settlement.lock();
        loop {
            match &*settlement {
                Settlement::Done(outcome) => return Some(outcome.clone()),
                Settlement::Abandoned => return None,
                Settlement::Pending(_) => {}
            }
            self.settled.wait(&mut settlement);
        }
    }

    /// Async counterpart of [`wait`](Self::wait); an abandoned episode
    /// resolves to `Canceled`.
    fn subscribe(&self) -> oneshot::Receiver<LoadOutcome<V, E>> {
        let (sender, receiver) = oneshot::channel();
        match &mut *self.settlement.lock() {
            Settlement::Pending(subscribers) => subscribers.push(sender),
            Settlement::Done(outcome) => {
                let _ = sender.send(outcome.clone());
            }
            Settlement::Abandoned => {}
        }
        receiver
    }
}

/// Counts one caller attached to an episode for as long as it is alive.
struct Waiter<V, E>(Arc<Episode<V, E>>);

impl<V, E> Waiter<V, E> {
    fn attach(episode: &Arc<Episode<V, E>>) -> Self {
        episode.waiters.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(episode))
    }

    fn episode(&self) -> &Episode<V, E> {
        &self.0
    }
}

impl<V, E> Drop for Waiter<V, E> {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Removes its episode's record when dropped and abandons the episode if it
/// never published.
///
/// Owned by whoever runs the load: the blocking caller that started the
/// episode, or the shared future of an async one. It therefore fires when
/// the load completes, when it unwinds, and when an async load is dropped
/// because every caller went away.
struct EpisodeSlot<K, V, E>
where
    K: Eq + Hash,
{
    table: Arc<InFlightTable<K, V, E>>,
    key: K,
    episode: Arc<Episode<V, E>>,
}

impl<K, V, E> Drop for EpisodeSlot<K, V, E>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let removed = {
            let mut table = self.table.lock();
            if table
                .get(&self.key)
                .is_some_and(|record| Arc::ptr_eq(&record.episode, &self.episode))
            {
                table.remove(&self.key)
            } else {
                None
            }
        };
        drop(removed);
        self.episode.abandon();
    }
}

/// A [`DataSource`] wrapper that collapses concurrent loads of a key.
pub struct ThunderingHerdGuard<K, V, S>
where
    K: Eq + Hash,
    V: Send + 'static,
    S: DataSource<K, V>,
{
    source: Arc<S>,
    in_flight: Arc<InFlightTable<K, V, S::Error>>,
    next_episode: AtomicU64,
}

impl<K, V, S> fmt::Debug for ThunderingHerdGuard<K, V, S>
where
    K: Eq + Hash,
    V: Send + 'static,
    S: DataSource<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThunderingHerdGuard")
            .field("records", &self.in_flight.lock().len())
            .field("episodes", &self.next_episode.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K, V, S> ThunderingHerdGuard<K, V, S>
where
    K: Eq + Hash,
    V: Send + 'static,
    S: DataSource<K, V>,
{
    /// Wraps `source`.
    ///
    /// # Example
    ///
    /// ```
    /// use gencache::source::FnSource;
    /// use gencache::source::herd::ThunderingHerdGuard;
    /// use gencache::traits::DataSource;
    ///
    /// let guard = ThunderingHerdGuard::new(FnSource::new(
    ///     |key: &u32| -> Result<Option<u32>, std::io::Error> { Ok(Some(key + 1)) },
    /// ));
    /// assert_eq!(guard.load(&1).unwrap(), Some(2));
    /// assert_eq!(guard.in_flight(), 0);
    /// ```
    pub fn new(source: S) -> Self {
        Self::from_arc(Arc::new(source))
    }

    /// Wraps a source that is shared with other owners.
    pub fn from_arc(source: Arc<S>) -> Self {
        Self {
            source,
            in_flight: Arc::new(Mutex::new(FxHashMap::default())),
            next_episode: AtomicU64::new(0),
        }
    }

    /// The wrapped source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Number of keys with a load in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of callers currently attached to the load of `key`, the one
    /// running it included.
    pub fn waiters(&self, key: &K) -> usize {
        self.in_flight
            .lock()
            .get(key)
            .map_or(0, |record| record.episode.waiters.load(Ordering::SeqCst))
    }
}

impl<K, V, S> ThunderingHerdGuard<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: DataSource<K, V> + 'static,
{
    fn open_episode(
        &self,
        key: &K,
    ) -> (Arc<Episode<V, S::Error>>, EpisodeSlot<K, V, S::Error>) {
        let id = self.next_episode.fetch_add(1, Ordering::Relaxed);
        trace!("started load episode {}", id);
        let episode = Arc::new(Episode::new(id));
        let slot = EpisodeSlot {
            table: Arc::clone(&self.in_flight),
            key: key.clone(),
            episode: Arc::clone(&episode),
        };
        (episode, slot)
    }

    /// Attaches a blocking caller. Returns the slot when this caller must
    /// run the load itself.
    fn attach_blocking(
        &self,
        key: &K,
    ) -> (Waiter<V, S::Error>, Option<EpisodeSlot<K, V, S::Error>>) {
        let mut table = self.in_flight.lock();
        if let Some(record) = table.get(key) {
            trace!("joining load episode {}", record.episode.id);
            return (Waiter::attach(&record.episode), None);
        }

        let (episode, slot) = self.open_episode(key);
        let waiter = Waiter::attach(&episode);
        table.insert(key.clone(), InFlightLoad { episode, load: None });
        (waiter, Some(slot))
    }

    /// Attaches an async caller. Returns the shared load unless the episode
    /// is run by a blocking caller.
    fn attach_async(
        &self,
        key: &K,
    ) -> (Waiter<V, S::Error>, Option<Shared<LoadFuture<V, S::Error>>>) {
        let mut table = self.in_flight.lock();
        if let Some(record) = table.get(key) {
            match &record.load {
                None => {
                    trace!("joining load episode {}", record.episode.id);
                    return (Waiter::attach(&record.episode), None);
                }
                Some(weak) => {
                    if let Some(load) = weak.upgrade() {
                        trace!("joining load episode {}", record.episode.id);
                        return (Waiter::attach(&record.episode), Some(load));
                    }
                    // Every caller left; the record goes when its slot drops.
                }
            }
        }

        let (episode, slot) = self.open_episode(key);
        let waiter = Waiter::attach(&episode);
        let source = Arc::clone(&self.source);
        let owned_key = key.clone();
        let load: LoadFuture<V, S::Error> = async move {
            let outcome = source
                .load_async(&owned_key)
                .await
                .map_err(SharedError::new);
            slot.episode.publish(&outcome);
            drop(slot);
            outcome
        }
        .boxed();
        let load = load.shared();
        table.insert(
            key.clone(),
            InFlightLoad {
                episode,
                load: load.downgrade(),
            },
        );
        (waiter, Some(load))
    }
}

impl<K, V, S> DataSource<K, V> for ThunderingHerdGuard<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: DataSource<K, V> + 'static,
{
    type Error = SharedError<S::Error>;

    fn load(&self, key: &K) -> Result<Option<V>, Self::Error> {
        loop {
            let (waiter, slot) = self.attach_blocking(key);
            if let Some(slot) = slot {
                let outcome = self.source.load(key).map_err(SharedError::new);
                slot.episode.publish(&outcome);
                return outcome;
            }
            if let Some(outcome) = waiter.episode().wait() {
                return outcome;
            }
        }
    }

    fn load_async<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<Option<V>, Self::Error>> {
        async move {
            loop {
                let (waiter, load) = self.attach_async(key);
                if let Some(load) = load {
                    return load.await;
                }
                if let Ok(outcome) = waiter.episode().subscribe().await {
                    return outcome;
                }
            }
        }
        .boxed()
    }
}

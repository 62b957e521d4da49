//! Periodic background collection.
//!
//! When a cache is configured with a `time_to_live`, a [`Sweeper`] thread
//! forces one collection per interval regardless of size pressure. Together
//! with the two-generation scheme this bounds the age of an unread entry to
//! `2 × time_to_live`: it is aged into gen1 by one sweep and evicted by the
//! next.
//!
//! The sweeper holds only a `Weak` reference to the cache it collects, so it
//! never keeps a dropped cache alive. Dropping the [`Sweeper`] handle stops
//! and joins the thread.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::config::CacheConfig;
use crate::policy::generational::GenerationalCore;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.condvar.notify_all();
        }
    }

    /// Sleeps for `interval` unless stopped first. Returns `true` if stopped.
    fn wait(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.condvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Handle to a background sweep thread.
pub struct Sweeper {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweeper")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Sweeper {
    /// Spawns a thread that calls `sweep` once per `interval` until `sweep`
    /// returns `false` or the handle is dropped.
    pub fn spawn<F>(interval: Duration, mut sweep: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("gencache-sweep".to_string())
            .spawn(move || {
                debug!("sweeper started, interval {:?}", interval);
                while !thread_signal.wait(interval) {
                    if !sweep() {
                        break;
                    }
                }
                debug!("sweeper stopped");
            })?;

        Ok(Self {
            signal,
            handle: Some(handle),
            interval,
        })
    }

    /// Starts a sweeper that force-collects `core` once per `time_to_live`.
    ///
    /// Returns `None` when no (or a zero) `time_to_live` is configured, or
    /// when the thread cannot be spawned; the cache then relies on its size
    /// limit alone.
    pub(crate) fn for_core<K, T>(
        core: &Arc<GenerationalCore<K, T>>,
        config: &CacheConfig,
    ) -> Option<Self>
    where
        K: Eq + Hash + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let interval = config.time_to_live.filter(|ttl| !ttl.is_zero())?;
        let target: Weak<GenerationalCore<K, T>> = Arc::downgrade(core);
        let spawned = Self::spawn(interval, move || match target.upgrade() {
            Some(core) => {
                core.force_collect();
                true
            },
            None => false,
        });
        match spawned {
            Ok(sweeper) => Some(sweeper),
            Err(err) => {
                warn!("{}: failed to spawn sweeper thread: {}", core.id(), err);
                None
            },
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            // A listener running on the sweep thread may drop the cache.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

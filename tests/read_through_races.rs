// ==============================================
// READ-THROUGH RACE TESTS (integration)
// ==============================================
//
// Exercises the unlocked-load protocol of ReadThroughCache under real thread
// and task concurrency.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use gencache::config::CacheConfig;
use gencache::policy::read_through::ReadThroughCache;
use gencache::traits::DataSource;
use parking_lot::{Condvar, Mutex};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("source unavailable")]
struct Unavailable;

/// Deterministic source: even keys map to `key * 10`, odd keys are absent,
/// keys divisible by 7 fail.
#[derive(Default)]
struct Table {
    calls: AtomicUsize,
}

impl DataSource<u32, u64> for Table {
    type Error = Unavailable;

    fn load(&self, key: &u32) -> Result<Option<u64>, Unavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key % 7 == 0 {
            Err(Unavailable)
        } else if key % 2 == 0 {
            Ok(Some(u64::from(*key) * 10))
        } else {
            Ok(None)
        }
    }
}

fn expected(key: u32) -> Result<Option<u64>, Unavailable> {
    if key % 7 == 0 {
        Err(Unavailable)
    } else if key % 2 == 0 {
        Ok(Some(u64::from(key) * 10))
    } else {
        Ok(None)
    }
}

/// Blocks loads of `key` until released; other keys answer at once.
struct Stalled {
    key: u32,
    entered: AtomicUsize,
    released: Mutex<bool>,
    release: Condvar,
}

impl Stalled {
    fn new(key: u32) -> Self {
        Self {
            key,
            entered: AtomicUsize::new(0),
            released: Mutex::new(false),
            release: Condvar::new(),
        }
    }

    fn release(&self) {
        *self.released.lock() = true;
        self.release.notify_all();
    }
}

impl DataSource<u32, u64> for Stalled {
    type Error = Unavailable;

    fn load(&self, key: &u32) -> Result<Option<u64>, Unavailable> {
        if *key == self.key {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let mut released = self.released.lock();
            while !*released {
                self.release.wait(&mut released);
            }
        }
        Ok(Some(u64::from(*key)))
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn slow_load_does_not_block_other_keys() {
    let cache = Arc::new(ReadThroughCache::new(
        CacheConfig::with_gen0_limit(1_000),
        Arc::new(Stalled::new(1)),
    ));

    let stalled = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get(&1))
    };
    wait_until(|| cache.source().entered.load(Ordering::SeqCst) == 1);

    // The stalled load holds no lock: other reads and writes complete.
    assert_eq!(cache.get(&2).unwrap(), Some(2));
    cache.insert(3, 33);
    assert_eq!(cache.get(&3).unwrap(), Some(33));
    assert_eq!(cache.len(), 2);

    cache.source().release();
    assert_eq!(stalled.join().unwrap().unwrap(), Some(1));
    assert_eq!(cache.len(), 3);
}

#[test]
fn insert_during_slow_load_wins() {
    let cache = Arc::new(ReadThroughCache::new(
        CacheConfig::with_gen0_limit(1_000),
        Arc::new(Stalled::new(5)),
    ));

    let stalled = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get(&5))
    };
    wait_until(|| cache.source().entered.load(Ordering::SeqCst) == 1);

    cache.insert(5, 500);
    cache.source().release();

    assert_eq!(stalled.join().unwrap().unwrap(), Some(500));
    assert_eq!(cache.peek(&5), Some(Some(500)));
}

#[test]
fn removed_key_during_slow_load_is_stored() {
    let cache = Arc::new(ReadThroughCache::new(
        CacheConfig::with_gen0_limit(1_000),
        Arc::new(Stalled::new(8)),
    ));

    let stalled = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get(&8))
    };
    wait_until(|| cache.source().entered.load(Ordering::SeqCst) == 1);

    // Version moves, but the key is absent on re-check: loaded value is kept.
    cache.insert(8, 80);
    cache.remove(&8);
    cache.source().release();

    assert_eq!(stalled.join().unwrap().unwrap(), Some(8));
    assert_eq!(cache.peek(&8), Some(Some(8)));
}

#[test]
fn concurrent_duplicate_misses_reach_source_without_herd_guard() {
    const CALLERS: usize = 4;
    let cache = Arc::new(ReadThroughCache::new(
        CacheConfig::with_gen0_limit(1_000),
        Arc::new(Stalled::new(9)),
    ));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get(&9))
        })
        .collect();
    wait_until(|| cache.source().entered.load(Ordering::SeqCst) == CALLERS);
    cache.source().release();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), Some(9));
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.metrics().loads, CALLERS as u64);
}

#[test]
fn randomized_readers_see_source_answers() {
    let cache = Arc::new(ReadThroughCache::new(
        CacheConfig::with_gen0_limit(32),
        Arc::new(Table::default()),
    ));

    let handles: Vec<_> = (0..4_u64)
        .map(|seed| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(seed);
                for _ in 0..5_000 {
                    let key = rng.random_range(0..200_u32);
                    assert_eq!(cache.get(&key), expected(key), "key {key}");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = cache.snapshot();
    assert!(snapshot.keys().all(|key| key % 7 != 0));
    for (key, value) in snapshot {
        assert_eq!(Ok(value), expected(key));
    }
}

#[test]
fn eviction_batches_carry_memoized_misses() {
    let cache = ReadThroughCache::new(CacheConfig::with_gen0_limit(100), Table::default());
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    cache.subscribe(Arc::new(move |_, batch| {
        let mut entries: Vec<(u32, Option<u64>)> = batch.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable();
        sink.lock().extend(entries);
    }));

    cache.get(&2).unwrap();
    cache.get(&3).unwrap();
    cache.force_collect();
    cache.force_collect();

    assert_eq!(*evicted.lock(), vec![(2, Some(20)), (3, None)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_readers_share_the_cache() {
    let cache = Arc::new(ReadThroughCache::new(
        CacheConfig::with_gen0_limit(1_000),
        Arc::new(Table::default()),
    ));

    let tasks: Vec<_> = (0..8_u32)
        .map(|t| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for key in (0..100_u32).map(|k| (k + t) % 100) {
                    assert_eq!(cache.get_async(&key).await, expected(key));
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Every non-failing key is resident; failing keys were retried each time.
    let resident = (0..100_u32).filter(|k| k % 7 != 0).count();
    assert_eq!(cache.len(), resident);
    assert!(cache.metrics().load_failures >= 15);
}

//! Single-instance benchmarks for the generational caches.
//!
//! Run with: `cargo bench --bench generational`
//!
//! Measures per-operation latency for direct gets and inserts, the
//! read-through miss path, and hit rate under a Zipfian workload.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use gencache::config::CacheConfig;
use gencache::policy::direct::DirectCache;
use gencache::policy::read_through::ReadThroughCache;
use gencache::source::FnSource;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

const GEN0_LIMIT: usize = 16_384;
const OPS: u64 = 100_000;
const UNIVERSE: u64 = 65_536;

// ============================================================================
// Direct Cache Latency (ns/op)
// ============================================================================

fn bench_direct(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_ns");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("get_hit", |b| {
        b.iter_custom(|iters| {
            let cache = DirectCache::new(CacheConfig::with_gen0_limit(GEN0_LIMIT));
            for i in 0..GEN0_LIMIT as u64 {
                cache.insert(i, Arc::new(i));
            }
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(cache.get(&(i % GEN0_LIMIT as u64)));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("get_promote", |b| {
        b.iter_custom(|iters| {
            let mut elapsed = std::time::Duration::ZERO;
            for _ in 0..iters {
                let cache = DirectCache::new(CacheConfig::unbounded());
                for i in 0..OPS {
                    cache.insert(i, i);
                }
                cache.force_collect();
                let start = Instant::now();
                for i in 0..OPS {
                    black_box(cache.get(&i));
                }
                elapsed += start.elapsed();
            }
            elapsed
        })
    });

    group.bench_function("insert_with_collections", |b| {
        b.iter_custom(|iters| {
            let cache = DirectCache::new(CacheConfig::with_gen0_limit(GEN0_LIMIT));
            let start = Instant::now();
            for iter in 0..iters {
                for i in 0..OPS {
                    cache.insert(iter * OPS + i, i);
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Read-Through Latency (ns/op)
// ============================================================================

fn bench_read_through(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_through_ns");
    group.throughput(Throughput::Elements(OPS));

    let source = || {
        FnSource::new(|key: &u64| -> Result<Option<u64>, std::io::Error> {
            Ok((key % 10 != 0).then_some(key * 2))
        })
    };

    group.bench_function("miss_then_load", |b| {
        b.iter_custom(|iters| {
            let cache: ReadThroughCache<u64, u64, _> =
                ReadThroughCache::new(CacheConfig::with_gen0_limit(GEN0_LIMIT), source());
            let start = Instant::now();
            for iter in 0..iters {
                for i in 0..OPS {
                    black_box(cache.get(&(iter * OPS + i)).ok());
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("hit", |b| {
        b.iter_custom(|iters| {
            let cache: ReadThroughCache<u64, u64, _> =
                ReadThroughCache::new(CacheConfig::with_gen0_limit(GEN0_LIMIT), source());
            for i in 0..GEN0_LIMIT as u64 {
                let _ = cache.get(&i);
            }
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(cache.get(&(i % GEN0_LIMIT as u64)).ok());
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Hit Rate Under Skew
// ============================================================================

fn bench_zipf_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("zipf_workload");
    group.throughput(Throughput::Elements(OPS));

    for exponent in [0.8, 1.0, 1.2] {
        group.bench_function(format!("direct_s{exponent}"), |b| {
            b.iter_custom(|iters| {
                let zipf = Zipf::new(UNIVERSE as f64, exponent).unwrap();
                let mut rng = SmallRng::seed_from_u64(42);
                let cache = DirectCache::new(CacheConfig::with_gen0_limit(GEN0_LIMIT / 4));
                let start = Instant::now();
                for _ in 0..iters {
                    for _ in 0..OPS {
                        let key = zipf.sample(&mut rng) as u64;
                        if cache.get(&key).is_none() {
                            cache.insert(key, key);
                        }
                        if rng.random_bool(0.01) {
                            cache.remove(&key);
                        }
                    }
                }
                let elapsed = start.elapsed();
                let metrics = cache.metrics();
                black_box(metrics.hit_rate());
                elapsed
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_direct, bench_read_through, bench_zipf_workload);
criterion_main!(benches);

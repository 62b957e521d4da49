use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use gencache::builder::CacheBuilder;

fn main() {
    let cache = Arc::new(
        CacheBuilder::new()
            .gen0_limit(4_096)
            .partitions(4)
            .build_partitioned_direct::<u64, u64>()
            .expect("valid configuration"),
    );

    let evicted = Arc::new(AtomicU64::new(0));
    {
        let evicted = Arc::clone(&evicted);
        cache.subscribe(Arc::new(move |_, batch| {
            evicted.fetch_add(batch.len() as u64, Ordering::Relaxed);
        }));
    }

    let writers: Vec<_> = (0..4_u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..10_000 {
                    cache.insert(t * 10_000 + i, i);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer panicked");
    }

    println!("partition lengths: {:?}", cache.partition_lengths());
    println!("resident: {}", cache.len());
    println!("evicted: {}", evicted.load(Ordering::Relaxed));
    println!("key 12345 lives in partition {}", cache.partition_index(&12_345));
}

// Expected output (lengths vary with hashing):
// partition lengths: [..., ..., ..., ...]
// resident: N
// evicted: 40000 - N
// key 12345 lives in partition P

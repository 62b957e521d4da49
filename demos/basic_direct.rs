use std::sync::Arc;

use gencache::config::CacheConfig;
use gencache::policy::direct::DirectCache;

fn main() {
    let cache: DirectCache<u32, String> = DirectCache::new(CacheConfig::with_gen0_limit(2));
    cache.subscribe(Arc::new(|source, batch| {
        let mut keys: Vec<_> = batch.keys().copied().collect();
        keys.sort_unstable();
        println!("{source} evicted {keys:?}");
    }));

    cache.insert(1, "alpha".to_string());
    cache.insert(2, "beta".to_string());
    cache.insert(3, "gamma".to_string());
    cache.insert(4, "delta".to_string());

    if let Some(value) = cache.get(&1) {
        println!("hit 1: {value}");
    }

    cache.insert(5, "epsilon".to_string());

    println!("contains 2? {}", cache.contains(&2));
    println!("contains 1? {}", cache.contains(&1));
}

// Expected output:
// hit 1: alpha
// cache#1 evicted [2]
// contains 2? false
// contains 1? true
//
// Explanation: gen0_limit=2. Inserting 3 ages {1, 2} into gen1. Reading 1
// promotes it back to gen0. Inserting 5 finds gen0 full ({3, 4, 1}), so gen1
// ({2}) is evicted and gen0 ages into gen1. Key 1 survives because it was
// read.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use gencache::builder::CacheBuilder;
use gencache::source::FnSource;

fn main() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let backend = FnSource::new(move |key: &u32| -> Result<Option<String>, std::io::Error> {
        counter.fetch_add(1, Ordering::SeqCst);
        // A slow lookup; odd keys do not exist.
        thread::sleep(Duration::from_millis(50));
        Ok((key % 2 == 0).then(|| format!("row-{key}")))
    });

    let cache = Arc::new(
        CacheBuilder::new()
            .gen0_limit(1_000)
            .build_herd_guarded::<u32, String, _>(backend)
            .expect("valid configuration"),
    );

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get(&42))
        })
        .collect();
    for reader in readers {
        println!("reader got {:?}", reader.join().expect("reader panicked"));
    }

    println!("missing key: {:?}", cache.get(&7));
    println!("missing key again: {:?}", cache.get(&7));
    println!("backend calls: {}", calls.load(Ordering::SeqCst));
}

// Expected output (backend calls may read 3 if a reader arrives after the
// first load completed):
// reader got Ok(Some("row-42"))   (eight times)
// missing key: Ok(None)
// missing key again: Ok(None)
// backend calls: 2

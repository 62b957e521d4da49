/// Point-in-time view of a cache's counters and gauges.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,

    pub loads: u64,
    pub load_failures: u64,

    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,

    pub collections: u64,
    pub evicted_entries: u64,

    // gauges captured at snapshot time
    pub gen0_len: usize,
    pub gen1_len: usize,
}

impl CacheMetricsSnapshot {
    /// Fraction of `get` calls answered without a miss, or `0.0` before the
    /// first call.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total resident entries at snapshot time.
    pub fn len(&self) -> usize {
        self.gen0_len + self.gen1_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sums two snapshots, e.g. across partitions.
    pub fn merge(self, other: Self) -> Self {
        Self {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            loads: self.loads + other.loads,
            load_failures: self.load_failures + other.load_failures,
            inserts: self.inserts + other.inserts,
            updates: self.updates + other.updates,
            removes: self.removes + other.removes,
            collections: self.collections + other.collections,
            evicted_entries: self.evicted_entries + other.evicted_entries,
            gen0_len: self.gen0_len + other.gen0_len,
            gen1_len: self.gen1_len + other.gen1_len,
        }
    }
}

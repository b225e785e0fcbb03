//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of lookups (every checkout)
    pub lookups: u64,
    /// Lookups that found the block already mapped to a slot
    pub hits: u64,
    /// Lookups that had to recycle a slot
    pub misses: u64,
    /// Recycled slots that previously held another block
    pub evictions: u64,
    /// Block reads issued to the device
    pub device_reads: u64,
    /// Block writes issued to the device
    pub device_writes: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    device_reads: AtomicU64,
    device_writes: AtomicU64,
}

impl StatsCounters {
    pub fn record_hit(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_read(&self) {
        self.device_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_write(&self) {
        self.device_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            device_reads: self.device_reads.load(Ordering::Relaxed),
            device_writes: self.device_writes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.lookups,
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.device_reads,
            &self.device_writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot().hit_rate(), 0.0);

        counters.record_hit();
        counters.record_hit();
        counters.record_miss();

        let stats = counters.snapshot();
        assert_eq!(stats.lookups, 3);
        assert!((stats.hit_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let counters = StatsCounters::default();
        counters.record_miss();
        counters.record_eviction();
        counters.record_device_read();
        counters.record_device_write();
        assert_ne!(counters.snapshot(), CacheStats::default());

        counters.reset();
        assert_eq!(counters.snapshot(), CacheStats::default());
    }
}

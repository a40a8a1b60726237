//! Store statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated without locking.
#[derive(Debug, Default)]
pub struct StoreStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    remote_fetches: AtomicU64,
    keys_initialized: AtomicU64,
    prefetch_resolutions: AtomicU64,
    rounds_applied: AtomicU64,
    gradients_pushed: AtomicU64,
    barriers: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub remote_fetches: u64,
    pub keys_initialized: u64,
    pub prefetch_resolutions: u64,
    pub rounds_applied: u64,
    pub gradients_pushed: u64,
    pub barriers: u64,
}

impl StoreStats {
    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_fetch(&self, keys: u64) {
        self.remote_fetches.fetch_add(keys, Ordering::Relaxed);
    }

    pub fn record_initialized(&self, keys: u64) {
        self.keys_initialized.fetch_add(keys, Ordering::Relaxed);
    }

    pub fn record_resolution(&self) {
        self.prefetch_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round(&self) -> u64 {
        self.rounds_applied.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_push(&self) {
        self.gradients_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_barrier(&self) {
        self.barriers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            keys_initialized: self.keys_initialized.load(Ordering::Relaxed),
            prefetch_resolutions: self.prefetch_resolutions.load(Ordering::Relaxed),
            rounds_applied: self.rounds_applied.load(Ordering::Relaxed),
            gradients_pushed: self.gradients_pushed.load(Ordering::Relaxed),
            barriers: self.barriers.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = StoreStats::default();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_remote_fetch(3);
        assert_eq!(stats.record_round(), 1);
        assert_eq!(stats.record_round(), 2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.remote_fetches, 3);
        assert_eq!(snapshot.rounds_applied, 2);
        assert_eq!(snapshot.barriers, 0);
    }
}

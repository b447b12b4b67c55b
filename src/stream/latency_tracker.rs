// src/stream/latency_tracker.rs
// Tick-to-processing latency distribution, written by the consumer thread
// and read by the orchestrator.

use crate::utils::CacheAligned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Smoothing factor for the median estimate
const ALPHA: f64 = 0.1;

/// Cache-aligned latency statistics to prevent false sharing.
///
/// Percentiles are streaming estimates (exponential moving averages biased
/// toward the tail), not exact order statistics: recording never allocates.
/// There is one writer; any number of threads may call [`snapshot`].
///
/// [`snapshot`]: LatencyStats::snapshot
pub struct LatencyStats {
    p50_ns: CacheAligned<AtomicU64>,
    p95_ns: CacheAligned<AtomicU64>,
    p99_ns: CacheAligned<AtomicU64>,
    max_ns: CacheAligned<AtomicU64>,
    total_ns: CacheAligned<AtomicU64>,
    count: CacheAligned<AtomicU64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            p50_ns: CacheAligned(AtomicU64::new(0)),
            p95_ns: CacheAligned(AtomicU64::new(0)),
            p99_ns: CacheAligned(AtomicU64::new(0)),
            max_ns: CacheAligned(AtomicU64::new(0)),
            total_ns: CacheAligned(AtomicU64::new(0)),
            count: CacheAligned(AtomicU64::new(0)),
        }
    }

    /// Record one latency sample.
    #[inline]
    pub fn record(&self, latency: Duration) {
        let ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.record_ns(ns);
    }

    pub fn record_ns(&self, latency_ns: u64) {
        let previous = self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.max_ns.fetch_max(latency_ns, Ordering::Relaxed);

        // Seed every estimate with the first sample instead of decaying from zero
        if previous == 0 {
            self.p50_ns.store(latency_ns, Ordering::Relaxed);
            self.p95_ns.store(latency_ns, Ordering::Relaxed);
            self.p99_ns.store(latency_ns, Ordering::Relaxed);
            return;
        }

        let sample = latency_ns as f64;

        let p50 = self.p50_ns.load(Ordering::Relaxed);
        self.p50_ns.store(ema(p50, sample, ALPHA), Ordering::Relaxed);

        // Tail estimates only move on samples above the level below them
        if latency_ns > p50 {
            let p95 = self.p95_ns.load(Ordering::Relaxed);
            self.p95_ns.store(ema(p95, sample, ALPHA * 0.5), Ordering::Relaxed);
        }

        let p95 = self.p95_ns.load(Ordering::Relaxed);
        if latency_ns > p95 {
            let p99 = self.p99_ns.load(Ordering::Relaxed);
            self.p99_ns.store(ema(p99, sample, ALPHA * 0.2), Ordering::Relaxed);
        }
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ns = self.total_ns.load(Ordering::Relaxed);
        LatencySnapshot {
            p50_ns: self.p50_ns.load(Ordering::Relaxed),
            p95_ns: self.p95_ns.load(Ordering::Relaxed),
            p99_ns: self.p99_ns.load(Ordering::Relaxed),
            max_ns: self.max_ns.load(Ordering::Relaxed),
            mean_ns: if count == 0 { 0 } else { total_ns / count },
            count,
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn ema(current: u64, sample: f64, alpha: f64) -> u64 {
    ((1.0 - alpha) * current as f64 + alpha * sample) as u64
}

/// Snapshot of latency statistics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySnapshot {
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub mean_ns: u64,
    pub count: u64,
}

impl LatencySnapshot {
    pub fn p50_us(&self) -> f64 {
        self.p50_ns as f64 / 1000.0
    }

    pub fn p95_us(&self) -> f64 {
        self.p95_ns as f64 / 1000.0
    }

    pub fn p99_us(&self) -> f64 {
        self.p99_ns as f64 / 1000.0
    }

    pub fn max_us(&self) -> f64 {
        self.max_ns as f64 / 1000.0
    }

    pub fn mean_us(&self) -> f64 {
        self.mean_ns as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_ns as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats_creation() {
        let snapshot = LatencyStats::new().snapshot();
        assert_eq!(snapshot, LatencySnapshot::default());
    }

    #[test]
    fn test_first_sample_seeds_estimates() {
        let stats = LatencyStats::new();
        stats.record(Duration::from_micros(10));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.p50_ns, 10_000);
        assert_eq!(snapshot.p95_ns, 10_000);
        assert_eq!(snapshot.p99_ns, 10_000);
        assert_eq!(snapshot.max_ns, 10_000);
        assert_eq!(snapshot.mean_ns, 10_000);
    }

    #[test]
    fn test_latency_recording() {
        let stats = LatencyStats::new();

        stats.record_ns(1000);
        stats.record_ns(2000);
        stats.record_ns(3000);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.max_ns, 3000);
        assert_eq!(snapshot.mean_ns, 2000);
        assert!(snapshot.p50_ns >= 1000 && snapshot.p50_ns <= 3000);
    }

    #[test]
    fn test_tail_estimates_track_spikes() {
        let stats = LatencyStats::new();
        for _ in 0..100 {
            stats.record_ns(1_000);
        }
        for _ in 0..20 {
            stats.record_ns(100_000);
        }

        let snapshot = stats.snapshot();
        assert!(snapshot.p95_ns > snapshot.p50_ns / 2);
        assert!(snapshot.p99_ns >= 1_000);
        assert_eq!(snapshot.max_ns, 100_000);
    }

    #[test]
    fn test_snapshot_conversions() {
        let snapshot = LatencySnapshot {
            p50_ns: 1_000_000,
            p95_ns: 5_000_000,
            p99_ns: 10_000_000,
            max_ns: 20_000_000,
            mean_ns: 2_000_000,
            count: 100,
        };

        assert_eq!(snapshot.p50_us(), 1000.0);
        assert_eq!(snapshot.p95_us(), 5000.0);
        assert_eq!(snapshot.p99_us(), 10000.0);
        assert_eq!(snapshot.mean_us(), 2000.0);
        assert_eq!(snapshot.max_ms(), 20.0);
    }
}

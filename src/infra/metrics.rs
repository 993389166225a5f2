//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total update ticks (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick latencies in microseconds (reset on report)
    tick_latency_sum_us: AtomicU64,
    /// Max tick latency in microseconds (reset on report)
    tick_latency_max_us: AtomicU64,
    /// Tick latency histogram buckets (reset on report)
    tick_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Position polls, successful or not (monotonic)
    polls_total: AtomicU64,
    /// Failed position polls (monotonic)
    poll_failures_total: AtomicU64,
    /// Debounced connection losses (monotonic)
    connection_losses: AtomicU64,
    /// Recoveries after a loss, including the first connect (monotonic)
    connection_recoveries: AtomicU64,
    /// Samples used raw because no walkable point was found (monotonic)
    clamp_fallbacks: AtomicU64,
    /// Route recomputations (monotonic)
    path_recomputes: AtomicU64,
    /// Recomputations that found no route (monotonic)
    path_failures: AtomicU64,
    /// Areas confirmed across all tours (monotonic)
    areas_confirmed: AtomicU64,
    /// Floors completed (monotonic)
    floors_completed: AtomicU64,
    /// Floors skipped because initialization failed (monotonic)
    floors_failed: AtomicU64,
    /// Tour events dropped due to egress channel full (monotonic)
    events_dropped: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_latency_sum_us: AtomicU64::new(0),
            tick_latency_max_us: AtomicU64::new(0),
            tick_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            polls_total: AtomicU64::new(0),
            poll_failures_total: AtomicU64::new(0),
            connection_losses: AtomicU64::new(0),
            connection_recoveries: AtomicU64::new(0),
            clamp_fallbacks: AtomicU64::new(0),
            path_recomputes: AtomicU64::new(0),
            path_failures: AtomicU64::new(0),
            areas_confirmed: AtomicU64::new(0),
            floors_completed: AtomicU64::new(0),
            floors_failed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one update tick (lock-free)
    #[inline]
    pub fn record_tick(&self, latency_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.tick_latency_max_us, latency_us);
        self.tick_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_poll(&self, success: bool) {
        self.polls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.poll_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_connection_change(&self, connected: bool) {
        if connected {
            self.connection_recoveries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connection_losses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_clamp_fallback(&self) {
        self.clamp_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_path_recompute(&self, success: bool) {
        self.path_recomputes.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.path_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_area_confirmed(&self) {
        self.areas_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_floor_completed(&self) {
        self.floors_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_floor_failed(&self) {
        self.floors_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn polls_total(&self) -> u64 {
        self.polls_total.load(Ordering::Relaxed)
    }

    pub fn poll_failures_total(&self) -> u64 {
        self.poll_failures_total.load(Ordering::Relaxed)
    }

    pub fn connection_losses(&self) -> u64 {
        self.connection_losses.load(Ordering::Relaxed)
    }

    pub fn connection_recoveries(&self) -> u64 {
        self.connection_recoveries.load(Ordering::Relaxed)
    }

    pub fn clamp_fallbacks(&self) -> u64 {
        self.clamp_fallbacks.load(Ordering::Relaxed)
    }

    pub fn path_recomputes(&self) -> u64 {
        self.path_recomputes.load(Ordering::Relaxed)
    }

    pub fn areas_confirmed(&self) -> u64 {
        self.areas_confirmed.load(Ordering::Relaxed)
    }

    pub fn floors_completed(&self) -> u64 {
        self.floors_completed.load(Ordering::Relaxed)
    }

    pub fn floors_failed(&self) -> u64 {
        self.floors_failed.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.tick_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.tick_latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.tick_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if ticks_count > 0 { latency_sum / ticks_count } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total(),
            ticks_per_sec,
            avg_tick_latency_us: avg_latency,
            max_tick_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            polls_total: self.polls_total(),
            poll_failures_total: self.poll_failures_total(),
            connection_losses: self.connection_losses(),
            connection_recoveries: self.connection_recoveries(),
            clamp_fallbacks: self.clamp_fallbacks(),
            path_recomputes: self.path_recomputes(),
            path_failures: self.path_failures.load(Ordering::Relaxed),
            areas_confirmed: self.areas_confirmed(),
            floors_completed: self.floors_completed(),
            floors_failed: self.floors_failed(),
            events_dropped: self.events_dropped(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    /// Tick latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub polls_total: u64,
    pub poll_failures_total: u64,
    pub connection_losses: u64,
    pub connection_recoveries: u64,
    pub clamp_fallbacks: u64,
    pub path_recomputes: u64,
    pub path_failures: u64,
    pub areas_confirmed: u64,
    pub floors_completed: u64,
    pub floors_failed: u64,
    pub events_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            avg_tick_us = %self.avg_tick_latency_us,
            max_tick_us = %self.max_tick_latency_us,
            p99_us = %self.lat_p99_us,
            polls = %self.polls_total,
            poll_failures = %self.poll_failures_total,
            losses = %self.connection_losses,
            clamp_fallbacks = %self.clamp_fallbacks,
            path_recomputes = %self.path_recomputes,
            areas_confirmed = %self.areas_confirmed,
            floors_completed = %self.floors_completed,
            floors_failed = %self.floors_failed,
            events_dropped = %self.events_dropped,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ticks_total(), 0);
        assert_eq!(metrics.polls_total(), 0);
    }

    #[test]
    fn test_record_tick() {
        let metrics = Metrics::new();

        metrics.record_tick(100);
        metrics.record_tick(200);

        assert_eq!(metrics.ticks_total(), 2);
        assert_eq!(metrics.tick_latency_sum_us.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.tick_latency_max_us.load(Ordering::Relaxed), 200);
    }

    #[test]
    fn test_record_poll() {
        let metrics = Metrics::new();
        metrics.record_poll(true);
        metrics.record_poll(false);
        metrics.record_poll(false);

        assert_eq!(metrics.polls_total(), 3);
        assert_eq!(metrics.poll_failures_total(), 2);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_tick(100);
        metrics.record_tick(200);
        metrics.record_tick(300);
        metrics.record_path_recompute(true);
        metrics.record_path_recompute(false);
        metrics.record_area_confirmed();

        let summary = metrics.report();

        assert_eq!(summary.ticks_total, 3);
        assert_eq!(summary.avg_tick_latency_us, 200);
        assert_eq!(summary.max_tick_latency_us, 300);
        assert_eq!(summary.path_recomputes, 2);
        assert_eq!(summary.path_failures, 1);
        assert_eq!(summary.areas_confirmed, 1);

        // Periodic counters reset, monotonic ones do not
        assert_eq!(metrics.ticks_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.ticks_total(), 3);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; NUM_BUCKETS];
        assert_eq!(percentile_from_buckets(&buckets, 0.5), 0);

        buckets[0] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.5), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 3200);
    }

    #[test]
    fn test_connection_changes() {
        let metrics = Metrics::new();
        metrics.record_connection_change(true);
        metrics.record_connection_change(false);
        metrics.record_connection_change(true);

        assert_eq!(metrics.connection_recoveries(), 2);
        assert_eq!(metrics.connection_losses(), 1);
    }
}

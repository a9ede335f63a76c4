//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::types::LeadTier;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Processing latency bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Dispatch round-trip bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800 ms
const DISPATCH_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

#[inline]
fn dispatch_bucket_index(latency_ms: u64) -> usize {
    DISPATCH_BOUNDS.partition_point(|&bound| bound < latency_ms)
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
fn percentile_from_buckets(
    buckets: &[u64; NUM_BUCKETS],
    bounds: &[u64; NUM_BUCKETS - 1],
    percentile: f64,
) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    // Rank of the sample at this percentile (1-based)
    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            // Overflow bucket reports 2x the last bound
            return bounds.get(i).copied().unwrap_or(bounds[NUM_BUCKETS - 2] * 2);
        }
    }
    bounds[NUM_BUCKETS - 2] * 2
}

#[inline]
fn tier_index(tier: LeadTier) -> usize {
    match tier {
        LeadTier::Qualified => 0,
        LeadTier::Disqualified => 1,
        LeadTier::HighValueCustomer => 2,
        LeadTier::LowValueCustomer => 3,
    }
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total events ever processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Events classified as bots (monotonic)
    bots_total: AtomicU64,
    /// Leads per tier, indexed by `tier_index` (monotonic)
    tiers_total: [AtomicU64; 4],
    /// Signals acknowledged by the platform (monotonic)
    signals_sent: AtomicU64,
    /// Signals that failed to dispatch (monotonic)
    signals_failed: AtomicU64,
    /// Signals skipped because dispatch is not configured (monotonic)
    signals_skipped: AtomicU64,
    /// Signals dropped because the worker queue was full (monotonic)
    signals_dropped: AtomicU64,
    /// Dispatch round-trip histogram in ms (reset on report)
    dispatch_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of dispatch round-trips in ms (reset on report)
    dispatch_sum_ms: AtomicU64,
    /// Max dispatch round-trip in ms (reset on report)
    dispatch_max_ms: AtomicU64,
    /// Max time from enqueue to worker pickup in µs (reset on report)
    queue_delay_max_us: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            bots_total: AtomicU64::new(0),
            tiers_total: std::array::from_fn(|_| AtomicU64::new(0)),
            signals_sent: AtomicU64::new(0),
            signals_failed: AtomicU64::new(0),
            signals_skipped: AtomicU64::new(0),
            signals_dropped: AtomicU64::new(0),
            dispatch_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            dispatch_sum_ms: AtomicU64::new(0),
            dispatch_max_ms: AtomicU64::new(0),
            queue_delay_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_bot(&self) {
        self.bots_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tier(&self, tier: LeadTier) {
        self.tiers_total[tier_index(tier)].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatch attempt that reached the platform (or failed trying)
    #[inline]
    pub fn record_dispatch(&self, success: bool, latency_ms: u64) {
        if success {
            self.signals_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.signals_failed.fetch_add(1, Ordering::Relaxed);
        }

        self.dispatch_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.dispatch_buckets[dispatch_bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.dispatch_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_signal_skipped(&self) {
        self.signals_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_signal_dropped(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_queue_delay(&self, delay_us: u64) {
        update_atomic_max(&self.queue_delay_max_us, delay_us);
    }

    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    pub fn bots_total(&self) -> u64 {
        self.bots_total.load(Ordering::Relaxed)
    }

    pub fn tier_total(&self, tier: LeadTier) -> u64 {
        self.tiers_total[tier_index(tier)].load(Ordering::Relaxed)
    }

    pub fn signals_sent(&self) -> u64 {
        self.signals_sent.load(Ordering::Relaxed)
    }

    pub fn signals_failed(&self) -> u64 {
        self.signals_failed.load(Ordering::Relaxed)
    }

    pub fn signals_skipped(&self) -> u64 {
        self.signals_skipped.load(Ordering::Relaxed)
    }

    pub fn signals_dropped(&self) -> u64 {
        self.signals_dropped.load(Ordering::Relaxed)
    }

    /// Generate a summary report and reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let dispatch_buckets = swap_buckets(&self.dispatch_buckets);
        let dispatch_sum = self.dispatch_sum_ms.swap(0, Ordering::Relaxed);
        let dispatch_max = self.dispatch_max_ms.swap(0, Ordering::Relaxed);
        let dispatch_count: u64 = dispatch_buckets.iter().sum();
        let queue_delay_max = self.queue_delay_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            events_total: self.events_total(),
            events_per_sec,
            avg_process_latency_us: if events_count > 0 { latency_sum / events_count } else { 0 },
            max_process_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, &BUCKET_BOUNDS, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, &BUCKET_BOUNDS, 0.99),
            lat_buckets,
            bots_total: self.bots_total(),
            qualified_total: self.tier_total(LeadTier::Qualified),
            disqualified_total: self.tier_total(LeadTier::Disqualified),
            high_value_total: self.tier_total(LeadTier::HighValueCustomer),
            low_value_total: self.tier_total(LeadTier::LowValueCustomer),
            signals_sent: self.signals_sent(),
            signals_failed: self.signals_failed(),
            signals_skipped: self.signals_skipped(),
            signals_dropped: self.signals_dropped(),
            dispatch_avg_ms: if dispatch_count > 0 { dispatch_sum / dispatch_count } else { 0 },
            dispatch_max_ms: dispatch_max,
            dispatch_p99_ms: percentile_from_buckets(&dispatch_buckets, &DISPATCH_BOUNDS, 0.99),
            queue_delay_max_us: queue_delay_max,
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
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub bots_total: u64,
    pub qualified_total: u64,
    pub disqualified_total: u64,
    pub high_value_total: u64,
    pub low_value_total: u64,
    pub signals_sent: u64,
    pub signals_failed: u64,
    pub signals_skipped: u64,
    pub signals_dropped: u64,
    pub dispatch_avg_ms: u64,
    pub dispatch_max_ms: u64,
    pub dispatch_p99_ms: u64,
    pub queue_delay_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            p99_us = %self.lat_p99_us,
            bots = %self.bots_total,
            qualified = %self.qualified_total,
            disqualified = %self.disqualified_total,
            high_value = %self.high_value_total,
            low_value = %self.low_value_total,
            signals_sent = %self.signals_sent,
            signals_failed = %self.signals_failed,
            signals_skipped = %self.signals_skipped,
            signals_dropped = %self.signals_dropped,
            dispatch_p99_ms = %self.dispatch_p99_ms,
            "metrics"
        );
    }
}

//! Lock-free station metrics and periodic reporting
//!
//! Counters are plain atomics updated from the controller task and read by
//! the reporter and the Prometheus endpoint. `report()` swaps the periodic
//! counters; everything suffixed `_total` is monotonic.
//!
//! NOTE: All atomics use Relaxed ordering - these are statistical counters
//! only. Do NOT use them for coordination or logic decisions.

use crate::domain::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Pipeline latency bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
const BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
const NUM_BUCKETS: usize = 11;

const ERROR_KINDS: [ErrorKind; 4] =
    [ErrorKind::Validation, ErrorKind::NotFound, ErrorKind::Connectivity, ErrorKind::Backend];

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

#[inline]
fn error_index(kind: ErrorKind) -> usize {
    match kind {
        ErrorKind::Validation => 0,
        ErrorKind::NotFound => 1,
        ErrorKind::Connectivity => 2,
        ErrorKind::Backend => 3,
    }
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

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
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

    // Last bucket reports 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for one station
pub struct Metrics {
    /// Scans that entered the pipeline (monotonic)
    scans_total: AtomicU64,
    /// Scans since last report (reset on report)
    scans_since_report: AtomicU64,
    /// Garments accepted into a reserved slot (monotonic)
    accepted_total: AtomicU64,
    /// Ticket families completed (monotonic)
    tickets_completed_total: AtomicU64,
    /// Hanger sensor confirmed a garment (monotonic)
    garments_on_conveyor_total: AtomicU64,
    /// Scan errors by kind (monotonic)
    errors_total: [AtomicU64; 4],
    /// Submissions rejected with a full queue (monotonic)
    rejected_busy_total: AtomicU64,
    /// Scans refused while the link was down (monotonic)
    rejected_disconnected_total: AtomicU64,
    /// Confirmed clear-conveyor gestures (monotonic)
    clear_conveyor_total: AtomicU64,
    /// Link connected -> disconnected transitions (monotonic)
    link_drops_total: AtomicU64,
    /// Current link state (1 = connected)
    link_connected: AtomicU64,
    /// Latest occupancy snapshot from the allocator
    slots_total: AtomicU64,
    slots_used: AtomicU64,
    /// Periodic pipeline latency (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    latency_sum_ms: AtomicU64,
    latency_max_ms: AtomicU64,
    /// Cumulative pipeline latency for Prometheus
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    latency_sum_ms_total: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_total: AtomicU64::new(0),
            scans_since_report: AtomicU64::new(0),
            accepted_total: AtomicU64::new(0),
            tickets_completed_total: AtomicU64::new(0),
            garments_on_conveyor_total: AtomicU64::new(0),
            errors_total: std::array::from_fn(|_| AtomicU64::new(0)),
            rejected_busy_total: AtomicU64::new(0),
            rejected_disconnected_total: AtomicU64::new(0),
            clear_conveyor_total: AtomicU64::new(0),
            link_drops_total: AtomicU64::new(0),
            link_connected: AtomicU64::new(1),
            slots_total: AtomicU64::new(0),
            slots_used: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_ms: AtomicU64::new(0),
            latency_max_ms: AtomicU64::new(0),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_ms_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_scan(&self) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        self.scans_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_accepted(&self) {
        self.accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticket_complete(&self) {
        self.tickets_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_garment_on_conveyor(&self) {
        self.garments_on_conveyor_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self, kind: ErrorKind) {
        self.errors_total[error_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_busy(&self) {
        self.rejected_busy_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_disconnected(&self) {
        self.rejected_disconnected_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_clear_conveyor(&self) {
        self.clear_conveyor_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a link state change; drops are counted on the falling edge
    pub fn set_link_connected(&self, connected: bool) {
        let previous = self.link_connected.swap(u64::from(connected), Ordering::Relaxed);
        if previous == 1 && !connected {
            self.link_drops_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_slot_occupancy(&self, total: u32, used: u32) {
        self.slots_total.store(u64::from(total), Ordering::Relaxed);
        self.slots_used.store(u64::from(used), Ordering::Relaxed);
    }

    /// Record end-to-end pipeline duration for one command
    #[inline]
    pub fn record_pipeline_latency(&self, latency_ms: u64) {
        let bucket = bucket_index(latency_ms);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_sum_ms_total.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_ms, latency_ms);
    }

    pub fn scans_total(&self) -> u64 {
        self.scans_total.load(Ordering::Relaxed)
    }

    pub fn accepted_total(&self) -> u64 {
        self.accepted_total.load(Ordering::Relaxed)
    }

    pub fn tickets_completed_total(&self) -> u64 {
        self.tickets_completed_total.load(Ordering::Relaxed)
    }

    pub fn errors_total(&self, kind: ErrorKind) -> u64 {
        self.errors_total[error_index(kind)].load(Ordering::Relaxed)
    }

    pub fn rejected_busy_total(&self) -> u64 {
        self.rejected_busy_total.load(Ordering::Relaxed)
    }

    pub fn clear_conveyor_total(&self) -> u64 {
        self.clear_conveyor_total.load(Ordering::Relaxed)
    }

    pub fn link_drops_total(&self) -> u64 {
        self.link_drops_total.load(Ordering::Relaxed)
    }

    /// Read all monotonic counters without resetting anything
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_total: self.scans_total.load(Ordering::Relaxed),
            accepted_total: self.accepted_total.load(Ordering::Relaxed),
            tickets_completed_total: self.tickets_completed_total.load(Ordering::Relaxed),
            garments_on_conveyor_total: self.garments_on_conveyor_total.load(Ordering::Relaxed),
            errors_total: ERROR_KINDS.map(|kind| (kind, self.errors_total(kind))),
            rejected_busy_total: self.rejected_busy_total.load(Ordering::Relaxed),
            rejected_disconnected_total: self.rejected_disconnected_total.load(Ordering::Relaxed),
            clear_conveyor_total: self.clear_conveyor_total.load(Ordering::Relaxed),
            link_drops_total: self.link_drops_total.load(Ordering::Relaxed),
            link_connected: self.link_connected.load(Ordering::Relaxed) == 1,
            slots_total: self.slots_total.load(Ordering::Relaxed),
            slots_used: self.slots_used.load(Ordering::Relaxed),
            latency_buckets: load_buckets(&self.latency_buckets_total),
            latency_sum_ms: self.latency_sum_ms_total.load(Ordering::Relaxed),
        }
    }

    /// Get metrics summary and reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let scans_count = self.scans_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_ms.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_ms.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);
        let pipelines: u64 = lat_buckets.iter().sum();

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let scans_per_min = if elapsed.as_secs_f64() > 0.0 {
            scans_count as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            scans_total: self.scans_total.load(Ordering::Relaxed),
            scans_per_min,
            accepted_total: self.accepted_total.load(Ordering::Relaxed),
            tickets_completed_total: self.tickets_completed_total.load(Ordering::Relaxed),
            garments_on_conveyor_total: self.garments_on_conveyor_total.load(Ordering::Relaxed),
            errors_total: ERROR_KINDS.iter().map(|&kind| self.errors_total(kind)).sum(),
            rejected_busy_total: self.rejected_busy_total.load(Ordering::Relaxed),
            rejected_disconnected_total: self.rejected_disconnected_total.load(Ordering::Relaxed),
            link_drops_total: self.link_drops_total.load(Ordering::Relaxed),
            avg_latency_ms: if pipelines > 0 { latency_sum / pipelines } else { 0 },
            max_latency_ms: latency_max,
            lat_buckets,
            lat_p50_ms: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_ms: percentile_from_buckets(&lat_buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Monotonic view used by the Prometheus endpoint
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub scans_total: u64,
    pub accepted_total: u64,
    pub tickets_completed_total: u64,
    pub garments_on_conveyor_total: u64,
    pub errors_total: [(ErrorKind, u64); 4],
    pub rejected_busy_total: u64,
    pub rejected_disconnected_total: u64,
    pub clear_conveyor_total: u64,
    pub link_drops_total: u64,
    pub link_connected: bool,
    pub slots_total: u64,
    pub slots_used: u64,
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_sum_ms: u64,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub scans_total: u64,
    pub scans_per_min: f64,
    pub accepted_total: u64,
    pub tickets_completed_total: u64,
    pub garments_on_conveyor_total: u64,
    pub errors_total: u64,
    pub rejected_busy_total: u64,
    pub rejected_disconnected_total: u64,
    pub link_drops_total: u64,
    pub avg_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Bounds: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800 ms
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_ms: u64,
    pub lat_p99_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scans_total = %self.scans_total,
            scans_per_min = format!("{:.1}", self.scans_per_min),
            accepted = %self.accepted_total,
            tickets_completed = %self.tickets_completed_total,
            on_conveyor = %self.garments_on_conveyor_total,
            errors = %self.errors_total,
            rejected_busy = %self.rejected_busy_total,
            rejected_disconnected = %self.rejected_disconnected_total,
            link_drops = %self.link_drops_total,
            avg_ms = %self.avg_latency_ms,
            max_ms = %self.max_latency_ms,
            p50_ms = %self.lat_p50_ms,
            p99_ms = %self.lat_p99_ms,
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
        assert_eq!(metrics.scans_total(), 0);
        assert_eq!(metrics.link_drops_total(), 0);
        assert!(metrics.snapshot().link_connected);
    }

    #[test]
    fn test_record_counters() {
        let metrics = Metrics::new();

        metrics.record_scan();
        metrics.record_scan();
        metrics.record_accepted();
        metrics.record_ticket_complete();
        metrics.record_error(ErrorKind::NotFound);
        metrics.record_error(ErrorKind::NotFound);
        metrics.record_error(ErrorKind::Validation);

        assert_eq!(metrics.scans_total(), 2);
        assert_eq!(metrics.accepted_total(), 1);
        assert_eq!(metrics.tickets_completed_total(), 1);
        assert_eq!(metrics.errors_total(ErrorKind::NotFound), 2);
        assert_eq!(metrics.errors_total(ErrorKind::Validation), 1);
        assert_eq!(metrics.errors_total(ErrorKind::Backend), 0);
    }

    #[test]
    fn test_link_drops_count_falling_edges() {
        let metrics = Metrics::new();

        metrics.set_link_connected(false);
        metrics.set_link_connected(false);
        metrics.set_link_connected(true);
        metrics.set_link_connected(false);

        assert_eq!(metrics.link_drops_total(), 2);
        assert!(!metrics.snapshot().link_connected);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();

        metrics.record_scan();
        metrics.record_pipeline_latency(100);
        metrics.record_pipeline_latency(300);

        let summary = metrics.report();
        assert_eq!(summary.scans_total, 1);
        assert_eq!(summary.avg_latency_ms, 200);
        assert_eq!(summary.max_latency_ms, 300);

        let summary = metrics.report();
        assert_eq!(summary.scans_total, 1);
        assert_eq!(summary.avg_latency_ms, 0);
        assert_eq!(summary.max_latency_ms, 0);

        // Cumulative histogram survives the report
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.latency_buckets.iter().sum::<u64>(), 2);
        assert_eq!(snapshot.latency_sum_ms, 400);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(25), 0);
        assert_eq!(bucket_index(26), 1);
        assert_eq!(bucket_index(1600), 6);
        assert_eq!(bucket_index(12800), 9);
        assert_eq!(bucket_index(12801), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();

        for _ in 0..100 {
            metrics.record_pipeline_latency(150);
        }

        let summary = metrics.report();
        assert_eq!(summary.lat_p50_ms, 200);
        assert_eq!(summary.lat_p99_ms, 200);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        m.record_scan();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.scans_total(), 4000);
    }
}

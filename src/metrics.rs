use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transform-latency percentiles over a sliding window of measurements
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    window: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl PercentileTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size,
        }
    }

    /// Record a measurement in nanoseconds, evicting the oldest when the
    /// window is full
    pub fn record(&self, nanos: u64) {
        let mut window = self.window.lock();
        if window.len() >= self.window_size {
            window.pop_front();
        }
        window.push_back(nanos);
    }

    /// Median latency in microseconds
    pub fn p50_us(&self) -> f64 {
        self.percentile(0.50)
    }

    /// 95th percentile latency in microseconds
    pub fn p95_us(&self) -> f64 {
        self.percentile(0.95)
    }

    /// 99th percentile latency in microseconds
    pub fn p99_us(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, p: f64) -> f64 {
        let window = self.window.lock();
        if window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<_> = window.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0
    }
}

/// Per-stage metrics collector
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Number of items the stage transformed
    items_processed: Arc<AtomicU64>,
    /// Number of items a transform rejected (forwarded failure-tagged)
    items_failed: Arc<AtomicU64>,
    /// Latency histogram (p50, p95, p99)
    latency_tracker: PercentileTracker,
    /// Creation time for throughput calculation
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            items_processed: Arc::new(AtomicU64::new(0)),
            items_failed: Arc::new(AtomicU64::new(0)),
            latency_tracker: PercentileTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully transformed item
    pub fn record_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected item
    pub fn record_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a latency measurement in nanoseconds
    pub fn record_latency(&self, nanos: u64) {
        self.latency_tracker.record(nanos);
    }

    /// Get the total number of items transformed
    pub fn total_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    /// Get the total number of items rejected
    pub fn total_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    /// Calculate current throughput in items per second
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed();
        let total = self.total_processed();
        if elapsed.as_secs_f64() == 0.0 {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed(),
            total_failed: self.total_failed(),
            throughput_ips: self.throughput_ips(),
            latency_p50_us: self.latency_tracker.p50_us(),
            latency_p95_us: self.latency_tracker.p95_us(),
            latency_p99_us: self.latency_tracker.p99_us(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub total_failed: u64,
    pub throughput_ips: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Processed: {}, Failed: {}, Throughput: {:.2} items/s, \
             Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.total_processed,
            self.total_failed,
            self.throughput_ips,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}

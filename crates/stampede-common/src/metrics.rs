//! Metrics collection and reporting

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Thread-safe counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe gauge
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Histogram for tracking latency distributions (seconds)
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_us: AtomicU64,
    count: AtomicU64,
    max_us: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_buckets(vec![
            0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ])
    }

    /// Create a histogram with custom bucket boundaries
    pub fn with_buckets(boundaries: Vec<f64>) -> Self {
        let buckets = (0..=boundaries.len())
            .map(|_| AtomicU64::new(0))
            .collect();

        Self {
            buckets,
            boundaries,
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    /// Record a value in seconds
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.boundaries.len());

        let micros = (value * 1_000_000.0) as u64;
        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Record a duration
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    /// Get the count of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the sum of observations
    pub fn sum(&self) -> f64 {
        self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Largest observation
    pub fn max(&self) -> f64 {
        self.max_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum() / n as f64,
        }
    }

    /// Approximate quantile: upper bound of the bucket holding the q-th
    /// observation. Observations past the last boundary report the maximum.
    pub fn quantile(&self, q: f64) -> f64 {
        let total = self.count();
        if total == 0 {
            return 0.0;
        }

        let rank = ((q.clamp(0.0, 1.0) * total as f64).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= rank {
                return self.boundaries.get(idx).copied().unwrap_or_else(|| self.max());
            }
        }
        self.max()
    }

    /// Get bucket counts
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.boundaries
            .iter()
            .zip(self.buckets.iter())
            .map(|(&boundary, count)| (boundary, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection of load-run metrics shared by all sessions of a run
#[derive(Debug, Default)]
pub struct LoadMetrics {
    // Connect metrics
    pub connects_total: Counter,
    pub connects_failed: Counter,

    // Aggregate metrics
    pub aggregates_total: Counter,
    pub aggregates_failed: Counter,
    pub documents_returned: Counter,
    pub aggregate_duration: Histogram,

    // Current state gauges
    pub active_sessions: Gauge,
}

impl LoadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect_success(&self) {
        self.connects_total.inc();
    }

    pub fn record_connect_failure(&self) {
        self.connects_total.inc();
        self.connects_failed.inc();
    }

    /// Record a completed aggregate with its client-observed duration
    pub fn record_aggregate_success(&self, documents: usize, duration: Duration) {
        self.aggregates_total.inc();
        self.documents_returned.add(documents as u64);
        self.aggregate_duration.observe_duration(duration);
    }

    pub fn record_aggregate_failure(&self) {
        self.aggregates_total.inc();
        self.aggregates_failed.inc();
    }

    /// Fraction of aggregates that failed
    pub fn aggregate_error_rate(&self) -> f64 {
        let total = self.aggregates_total.get();
        if total == 0 {
            0.0
        } else {
            self.aggregates_failed.get() as f64 / total as f64
        }
    }

    /// Point-in-time copy for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hist = &self.aggregate_duration;
        MetricsSnapshot {
            connects_total: self.connects_total.get(),
            connects_failed: self.connects_failed.get(),
            aggregates_total: self.aggregates_total.get(),
            aggregates_failed: self.aggregates_failed.get(),
            documents_returned: self.documents_returned.get(),
            active_sessions: self.active_sessions.get(),
            latency: LatencySummary {
                mean_ms: hist.mean() * 1000.0,
                p50_ms: hist.quantile(0.50) * 1000.0,
                p95_ms: hist.quantile(0.95) * 1000.0,
                p99_ms: hist.quantile(0.99) * 1000.0,
                max_ms: hist.max() * 1000.0,
            },
        }
    }

    /// Export metrics in Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        Self::write_counter(&mut out, "stampede_connects_total",
            "Total connect attempts", self.connects_total.get());
        Self::write_counter(&mut out, "stampede_connects_failed_total",
            "Total failed connect attempts", self.connects_failed.get());
        Self::write_counter(&mut out, "stampede_aggregates_total",
            "Total aggregate calls", self.aggregates_total.get());
        Self::write_counter(&mut out, "stampede_aggregates_failed_total",
            "Total failed aggregate calls", self.aggregates_failed.get());
        Self::write_counter(&mut out, "stampede_documents_returned_total",
            "Total documents materialized", self.documents_returned.get());

        Self::write_gauge(&mut out, "stampede_active_sessions",
            "Sessions currently running", self.active_sessions.get());

        Self::write_histogram(&mut out, "stampede_aggregate_duration_seconds",
            "Client-observed aggregate duration in seconds", &self.aggregate_duration);

        out
    }

    fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
        out.push_str(&format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n\n",
            name, help, name, name, value
        ));
    }

    fn write_gauge(out: &mut String, name: &str, help: &str, value: u64) {
        out.push_str(&format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n\n",
            name, help, name, name, value
        ));
    }

    fn write_histogram(out: &mut String, name: &str, help: &str, hist: &Histogram) {
        out.push_str(&format!("# HELP {} {}\n# TYPE {} histogram\n", name, help, name));
        let mut cumulative = 0u64;
        for (boundary, count) in hist.buckets() {
            cumulative += count;
            out.push_str(&format!("{}_bucket{{le=\"{}\"}} {}\n", name, boundary, cumulative));
        }
        out.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", name, hist.count()));
        out.push_str(&format!("{}_sum {}\n", name, hist.sum()));
        out.push_str(&format!("{}_count {}\n\n", name, hist.count()));
    }
}

/// Serializable view of [`LoadMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub connects_total: u64,
    pub connects_failed: u64,
    pub aggregates_total: u64,
    pub aggregates_failed: u64,
    pub documents_returned: u64,
    pub active_sessions: u64,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.inc();
        gauge.inc();
        assert_eq!(gauge.get(), 2);

        gauge.dec();
        assert_eq!(gauge.get(), 1);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new();

        hist.observe(0.05);
        hist.observe(0.1);
        hist.observe(0.5);

        assert_eq!(hist.count(), 3);
        assert!((hist.sum() - 0.65).abs() < 0.001);
        assert!((hist.max() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_histogram_quantiles() {
        let hist = Histogram::with_buckets(vec![0.01, 0.1, 1.0]);
        for _ in 0..90 {
            hist.observe(0.005);
        }
        for _ in 0..10 {
            hist.observe(0.05);
        }

        assert_eq!(hist.quantile(0.5), 0.01);
        assert_eq!(hist.quantile(0.8), 0.01);
        assert_eq!(hist.quantile(0.95), 0.1);
        assert_eq!(Histogram::new().quantile(0.99), 0.0);
    }

    #[test]
    fn test_histogram_overflow_reports_max() {
        let hist = Histogram::with_buckets(vec![0.01]);
        hist.observe(3.0);
        assert!((hist.quantile(0.99) - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_load_metrics() {
        let metrics = LoadMetrics::new();

        metrics.record_connect_success();
        metrics.record_connect_failure();
        metrics.record_aggregate_success(12, Duration::from_millis(4));
        metrics.record_aggregate_success(0, Duration::from_millis(6));
        metrics.record_aggregate_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connects_total, 2);
        assert_eq!(snapshot.connects_failed, 1);
        assert_eq!(snapshot.aggregates_total, 3);
        assert_eq!(snapshot.aggregates_failed, 1);
        assert_eq!(snapshot.documents_returned, 12);
        assert!((snapshot.latency.mean_ms - 5.0).abs() < 0.01);
        assert!((metrics.aggregate_error_rate() - 1.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = LoadMetrics::new();
        metrics.record_aggregate_success(3, Duration::from_millis(2));

        let text = metrics.export_prometheus();
        assert!(text.contains("stampede_aggregates_total 1"));
        assert!(text.contains("stampede_documents_returned_total 3"));
        assert!(text.contains("stampede_aggregate_duration_seconds_bucket{le=\"+Inf\"} 1"));
    }
}

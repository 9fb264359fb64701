//! Rolling performance counters shared by provider adapters.
//!
//! Every adapter updates its recorder on each completed or failed call;
//! the hub's monitor pushes snapshots into the router periodically.

use std::sync::Mutex;

use chrono::Utc;

use modelhub_types::health::PerformanceMetrics;

struct MetricsInner {
    metrics: PerformanceMetrics,
    total_latency_ms: u64,
}

/// Thread-safe recorder for one adapter's rolling metrics.
pub struct MetricsRecorder {
    inner: Mutex<MetricsInner>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner {
                metrics: PerformanceMetrics::default(),
                total_latency_ms: 0,
            }),
        }
    }

    /// Record a successful call with its latency, cost, and token usage.
    pub fn record_success(&self, latency_ms: u64, cost: f64, tokens: u64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.metrics.request_count += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_cost += cost;
        inner.metrics.total_tokens += tokens;
        inner.total_latency_ms += latency_ms;
        inner.metrics.avg_latency_ms =
            inner.total_latency_ms as f64 / inner.metrics.request_count as f64;
        inner.metrics.last_updated = Utc::now();
    }

    /// Record a failed call with its latency.
    pub fn record_failure(&self, latency_ms: u64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.metrics.request_count += 1;
        inner.metrics.failure_count += 1;
        inner.total_latency_ms += latency_ms;
        inner.metrics.avg_latency_ms =
            inner.total_latency_ms as f64 / inner.metrics.request_count as f64;
        inner.metrics.last_updated = Utc::now();
    }

    /// Current counter snapshot.
    pub fn snapshot(&self) -> PerformanceMetrics {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .metrics
            .clone()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_updates_counters() {
        let recorder = MetricsRecorder::new();
        recorder.record_success(100, 0.01, 150);
        recorder.record_success(300, 0.02, 250);

        let metrics = recorder.snapshot();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.success_count, 2);
        assert_eq!(metrics.failure_count, 0);
        assert!((metrics.avg_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!((metrics.total_cost - 0.03).abs() < 1e-9);
        assert_eq!(metrics.total_tokens, 400);
    }

    #[test]
    fn test_failure_counts_toward_error_rate() {
        let recorder = MetricsRecorder::new();
        recorder.record_success(100, 0.01, 100);
        recorder.record_failure(500);

        let metrics = recorder.snapshot();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.failure_count, 1);
        assert!((metrics.error_rate() - 0.5).abs() < f64::EPSILON);
        assert!((metrics.avg_latency_ms - 300.0).abs() < f64::EPSILON);
    }
}

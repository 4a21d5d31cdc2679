use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Remote store usage metrics
#[derive(Debug, Default)]
pub struct StoreApiMetrics {
    pub total_requests: AtomicU64,
    pub rate_limit_hits: AtomicU64,
    pub errors: AtomicU64,
}

impl StoreApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        warn!("Remote store rate limit hit");
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> StoreApiStats {
        StoreApiStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Remote store metrics: requests={}, rate_limits={}, errors={}",
            stats.total_requests, stats.rate_limit_hits, stats.errors
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreApiStats {
    pub total_requests: u64,
    pub rate_limit_hits: u64,
    pub errors: u64,
}

static STORE_METRICS: std::sync::LazyLock<StoreApiMetrics> =
    std::sync::LazyLock::new(StoreApiMetrics::new);

pub fn store_metrics() -> &'static StoreApiMetrics {
    &STORE_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate() {
        let metrics = StoreApiMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_error();
        metrics.record_rate_limit_hit();
        assert_eq!(
            metrics.get_stats(),
            StoreApiStats {
                total_requests: 2,
                rate_limit_hits: 1,
                errors: 1,
            }
        );
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Capability validation counters
#[derive(Debug, Default)]
pub struct ValidationMetrics {
    pub validations_started: AtomicU64,
    pub probes_run: AtomicU64,
    pub validated: AtomicU64,
    pub failed: AtomicU64,
    pub timeouts: AtomicU64,
    pub panics: AtomicU64,
    pub cancellations: AtomicU64,
    pub secret_failures: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl ValidationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_validation_started(&self) {
        self.validations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verdict(&self, validated: bool) {
        self.probes_run.fetch_add(1, Ordering::Relaxed);
        if validated {
            self.validated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_secret_failure(&self) {
        self.secret_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            validations_started: self.validations_started.load(Ordering::Relaxed),
            probes_run: self.probes_run.load(Ordering::Relaxed),
            validated: self.validated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            secret_failures: self.secret_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            validations = stats.validations_started,
            probes = stats.probes_run,
            validated = stats.validated,
            failed = stats.failed,
            timeouts = stats.timeouts,
            panics = stats.panics,
            cancellations = stats.cancellations,
            secret_failures = stats.secret_failures,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            "Validation metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationStats {
    pub validations_started: u64,
    pub probes_run: u64,
    pub validated: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub panics: u64,
    pub cancellations: u64,
    pub secret_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Global metrics instance
static VALIDATION_METRICS: std::sync::LazyLock<ValidationMetrics> =
    std::sync::LazyLock::new(ValidationMetrics::new);

pub fn validation_metrics() -> &'static ValidationMetrics {
    &VALIDATION_METRICS
}

/// Time an operation and log its duration
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

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdicts_split_into_validated_and_failed() {
        let metrics = ValidationMetrics::new();
        metrics.record_verdict(true);
        metrics.record_verdict(false);
        metrics.record_verdict(false);
        metrics.record_timeout();

        let stats = metrics.get_stats();
        assert_eq!(stats.probes_run, 3);
        assert_eq!(stats.validated, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.timeouts, 1);
    }
}

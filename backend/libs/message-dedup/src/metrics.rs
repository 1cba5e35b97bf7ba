//! Deduplication metrics for observability

use prometheus::{CounterVec, IntCounter, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<DedupMetricsInner> = OnceLock::new();

struct DedupMetricsInner {
    checks: CounterVec,
    marks: IntCounter,
    store_errors: CounterVec,
}

impl DedupMetricsInner {
    fn new() -> Self {
        Self {
            checks: CounterVec::new(
                Opts::new(
                    "message_dedup_checks_total",
                    "Total deduplication checks by outcome",
                ),
                &["result"],
            )
            .expect("valid metric definition"),
            marks: IntCounter::new(
                "message_dedup_marks_total",
                "Total messages marked as processed",
            )
            .expect("valid metric definition"),
            store_errors: CounterVec::new(
                Opts::new(
                    "message_dedup_store_errors_total",
                    "Total backing store errors absorbed by the gate",
                ),
                &["operation", "error_type"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.checks.clone()))?;
        registry.register(Box::new(self.marks.clone()))?;
        registry.register(Box::new(self.store_errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static DedupMetricsInner {
    METRICS.get_or_init(DedupMetricsInner::new)
}

/// Dedup metrics wrapper
#[derive(Clone, Default)]
pub struct DedupMetrics;

impl DedupMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_new(&self) {
        get_metrics().checks.with_label_values(&["new"]).inc();
    }

    pub fn record_duplicate(&self) {
        get_metrics().checks.with_label_values(&["duplicate"]).inc();
    }

    pub fn record_mark(&self) {
        get_metrics().marks.inc();
    }

    pub fn record_store_error(&self, operation: &str, error_type: &str) {
        get_metrics()
            .store_errors
            .with_label_values(&[operation, error_type])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_exposes_families() {
        let registry = Registry::new();
        DedupMetrics::register(&registry).unwrap();

        let metrics = DedupMetrics::new();
        metrics.record_new();
        metrics.record_duplicate();
        metrics.record_mark();
        metrics.record_store_error("get", "timeout");

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"message_dedup_checks_total".to_string()));
        assert!(names.contains(&"message_dedup_marks_total".to_string()));
        assert!(names.contains(&"message_dedup_store_errors_total".to_string()));
    }

    #[test]
    fn test_double_register_fails() {
        let registry = Registry::new();
        DedupMetrics::register(&registry).unwrap();
        assert!(DedupMetrics::register(&registry).is_err());
    }

    #[test]
    fn test_store_error_labels() {
        let registry = Registry::new();
        DedupMetrics::register(&registry).unwrap();
        DedupMetrics::new().record_store_error("check_and_mark", "unavailable");

        let family = registry
            .gather()
            .into_iter()
            .find(|f| f.get_name() == "message_dedup_store_errors_total")
            .unwrap();
        let mut labels: Vec<&str> = family.get_metric()[0]
            .get_label()
            .iter()
            .map(|l| l.get_name())
            .collect();
        labels.sort_unstable();

        assert_eq!(labels, vec!["error_type", "operation"]);
    }
}

//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    HistogramVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Query outcome metrics
    pub queries: CounterVec,
    pub gate_decisions: CounterVec,

    // Stage metrics
    pub stage_failures: CounterVec,
    pub stage_duration: HistogramVec,

    // Generative provider metrics
    pub llm_requests: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries = register_counter_vec_with_registry!(
            Opts::new("rag_queries_total", "Total answered queries by provenance"),
            &["source"],
            registry
        )?;

        let gate_decisions = register_counter_vec_with_registry!(
            Opts::new("rag_gate_decisions_total", "Relevance gate decisions"),
            &["decision"],
            registry
        )?;

        let stage_failures = register_counter_vec_with_registry!(
            Opts::new("rag_stage_failures_total", "Pipeline stage failures, including timeouts"),
            &["stage"],
            registry
        )?;

        let stage_duration = register_histogram_vec_with_registry!(
            "rag_stage_duration_seconds",
            "Pipeline stage duration in seconds",
            &["stage"],
            registry
        )?;

        let llm_requests = register_counter_vec_with_registry!(
            Opts::new("rag_llm_requests_total", "Generative provider calls by outcome"),
            &["status"],
            registry
        )?;

        Ok(Self {
            registry,
            queries,
            gate_decisions,
            stage_failures,
            stage_duration,
            llm_requests,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record an answered query
    pub fn record_query(&self, source: &str) {
        self.queries.with_label_values(&[source]).inc();
    }

    /// Record a gate decision (`accept`, `no_match`, `below_threshold`)
    pub fn record_gate(&self, decision: &str) {
        self.gate_decisions.with_label_values(&[decision]).inc();
    }

    pub fn record_stage_failure(&self, stage: &str) {
        self.stage_failures.with_label_values(&[stage]).inc();
    }

    pub fn observe_stage(&self, stage: &str, elapsed: Duration) {
        self.stage_duration
            .with_label_values(&[stage])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a provider call (`success`, `error`, `circuit_open`)
    pub fn record_llm_request(&self, status: &str) {
        self.llm_requests.with_label_values(&[status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_export_contains_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_query("retrieval");
        metrics.record_gate("below_threshold");
        metrics.record_stage_failure("embedding");
        metrics.observe_stage("retrieving", Duration::from_millis(3));
        metrics.record_llm_request("success");

        let text = metrics.export_prometheus();
        assert!(text.contains("rag_queries_total{source=\"retrieval\"} 1"));
        assert!(text.contains("rag_gate_decisions_total{decision=\"below_threshold\"} 1"));
        assert!(text.contains("rag_stage_failures_total{stage=\"embedding\"} 1"));
        assert!(text.contains("rag_stage_duration_seconds_count{stage=\"retrieving\"} 1"));
        assert!(text.contains("rag_llm_requests_total{status=\"success\"} 1"));
    }
}

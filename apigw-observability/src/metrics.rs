//! Prometheus-backed metrics collector, grounded on the teacher's
//! `ando-observability/src/metrics.rs` (`MetricsCollector`,
//! `IntCounterVec`/`HistogramVec`/`IntGauge` shape, `gather_text`
//! scrape), pared down to the counters/gauges this gateway's pipeline
//! actually emits: request totals, total and per-filter latency, and
//! circuit-breaker state.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

pub struct MetricsCollector {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub filter_duration: HistogramVec,
    pub circuit_state: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("apigw_requests_total", "Total gateway requests").namespace("apigw"),
            &["interface", "status"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("apigw_request_duration_seconds", "Total request latency")
                .namespace("apigw")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["interface"],
        )?;

        let filter_duration = HistogramVec::new(
            HistogramOpts::new("apigw_filter_duration_seconds", "Per-filter latency")
                .namespace("apigw")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["filter"],
        )?;

        let circuit_state = IntGaugeVec::new(
            Opts::new("apigw_circuit_breaker_state", "0=CLOSED 1=HALF_OPEN 2=OPEN").namespace("apigw"),
            &["service"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(filter_duration.clone()))?;
        registry.register(Box::new(circuit_state.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            filter_duration,
            circuit_state,
        })
    }

    pub fn record_request(&self, interface: &str, status: u16, total_ms: f64) {
        self.requests_total.with_label_values(&[interface, &status.to_string()]).inc();
        self.request_duration.with_label_values(&[interface]).observe(total_ms / 1000.0);
    }

    pub fn record_filter_timing(&self, filter: &str, ms: f64) {
        self.filter_duration.with_label_values(&[filter]).observe(ms / 1000.0);
    }

    pub fn record_circuit_state(&self, service: &str, state_code: i64) {
        self.circuit_state.with_label_values(&[service]).set(state_code);
    }

    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_text_includes_registered_metrics() {
        let m = MetricsCollector::new().unwrap();
        m.record_request("echo", 200, 12.5);
        let text = m.gather_text();
        assert!(text.contains("apigw_requests_total"));
    }
}

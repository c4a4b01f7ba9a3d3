//! Process-wide Prometheus metrics, rendered at `GET /metrics` by
//! [`crate::handler::handle`]. Grounded on `kimberlite-server`'s use of
//! the `prometheus` crate for its own sidecar endpoint, generalized here
//! to the coordinator's request and lifecycle counters.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

pub struct Metrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub startup_errors: IntCounter,
    pub shutdown_errors: IntCounter,
    pub active_connections: IntGauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("blobcoord_requests_total", "Total HTTP requests handled, by route and status class"),
            &["route", "status_class"],
        )
        .expect("static metric definition is valid");
        registry.register(Box::new(requests_total.clone())).expect("metric name is unique");

        let startup_errors = IntCounter::new("blobcoord_startup_errors_total", "Server startup failures").expect("static metric definition is valid");
        registry.register(Box::new(startup_errors.clone())).expect("metric name is unique");

        let shutdown_errors = IntCounter::new("blobcoord_shutdown_errors_total", "Worker threads that overran their shutdown budget")
            .expect("static metric definition is valid");
        registry.register(Box::new(shutdown_errors.clone())).expect("metric name is unique");

        let active_connections = IntGauge::new("blobcoord_active_connections", "Connections currently being served").expect("static metric definition is valid");
        registry.register(Box::new(active_connections.clone())).expect("metric name is unique");

        Self {
            registry,
            requests_total,
            startup_errors,
            shutdown_errors,
            active_connections,
        }
    }

    /// The process-wide metrics registry. A `OnceLock` rather than a
    /// `lazy_static`/`once_cell` dependency since the standard library's
    /// own cell now covers this case.
    pub fn global() -> &'static Metrics {
        static METRICS: OnceLock<Metrics> = OnceLock::new();
        METRICS.get_or_init(Metrics::new)
    }

    pub fn record_request(&self, route: &str, status: u16) {
        let status_class = match status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "unknown",
        };
        self.requests_total.with_label_values(&[route, status_class]).inc();
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).expect("prometheus text encoding never fails for our metric types");
        String::from_utf8(buf).expect("prometheus text encoder emits valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_metrics() {
        let metrics = Metrics::global();
        metrics.record_request("/blobs/x", 200);
        metrics.startup_errors.inc();
        let rendered = metrics.render();
        assert!(rendered.contains("blobcoord_requests_total"));
        assert!(rendered.contains("blobcoord_startup_errors_total"));
    }
}

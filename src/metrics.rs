//! Prometheus metrics for the gateway.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.

use prometheus::{
    opts, register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};

/// Prometheus metrics recorder. All metrics are registered in the global
/// default registry.
pub struct PrometheusRecorder {
    requests_total: CounterVec,
    impressions_total: Counter,
    clicks_total: CounterVec,
    rate_limited_total: Counter,
    webhook_deliveries_total: CounterVec,
}

impl PrometheusRecorder {
    /// Create and register all metrics in the global Prometheus registry.
    pub fn new() -> Self {
        let requests_total = register_counter_vec!(
            opts!("adparcel_requests_total", "API requests by route class and status"),
            &["route", "status"]
        )
        .expect("failed to register adparcel_requests_total");

        let impressions_total = register_counter!(opts!(
            "adparcel_impressions_total",
            "Ad impressions served"
        ))
        .expect("failed to register adparcel_impressions_total");

        let clicks_total = register_counter_vec!(
            opts!("adparcel_clicks_total", "Ad clicks by credit outcome"),
            &["credited"]
        )
        .expect("failed to register adparcel_clicks_total");

        let rate_limited_total = register_counter!(opts!(
            "adparcel_rate_limited_total",
            "Requests rejected by the per-IP limiter"
        ))
        .expect("failed to register adparcel_rate_limited_total");

        let webhook_deliveries_total = register_counter_vec!(
            opts!("adparcel_webhook_deliveries_total", "Outbound webhook deliveries"),
            &["outcome"]
        )
        .expect("failed to register adparcel_webhook_deliveries_total");

        Self {
            requests_total,
            impressions_total,
            clicks_total,
            rate_limited_total,
            webhook_deliveries_total,
        }
    }

    pub fn record_request(&self, route: &str, status: u16) {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    pub fn record_impression(&self) {
        self.impressions_total.inc();
    }

    pub fn record_click(&self, credited: bool) {
        self.clicks_total
            .with_label_values(&[if credited { "true" } else { "false" }])
            .inc();
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    pub fn record_webhook(&self, delivered: bool) {
        self.webhook_deliveries_total
            .with_label_values(&[if delivered { "delivered" } else { "failed" }])
            .inc();
    }
}

impl Default for PrometheusRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_valid_text() {
        let output = encode_metrics();
        assert!(output.is_ascii() || output.is_empty());
    }
}

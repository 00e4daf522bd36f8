//! # Prometheus Metrics
//!
//! Operational metrics for the ledger service, served in text exposition
//! format from `/metrics` on the dedicated metrics port.
//!
//! Everything lives in a custom [`prometheus::Registry`] under the `souk`
//! namespace, so the exported families never collide with whatever else a
//! host process might register globally.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the service.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total transaction records written (all kinds, both legs of pairs).
    pub transactions_total: IntCounter,
    /// Total completed peer-to-peer transfers.
    pub transfers_total: IntCounter,
    /// Total ledger operations rejected by a precondition.
    pub rejected_operations_total: IntCounter,
    /// Total push messages handed to the gateway.
    pub push_messages_sent_total: IntCounter,
    /// Total push-gateway batch requests issued.
    pub push_batches_total: IntCounter,
    /// Currently connected WebSocket subscribers.
    pub ws_clients: IntGauge,
    /// Number of registered users.
    pub user_count: IntGauge,
    /// Histogram of ledger operation latency in seconds.
    pub op_latency_seconds: Histogram,
}

impl ServiceMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("souk".into()), None)
            .expect("failed to create prometheus registry");

        let transactions_total = IntCounter::new(
            "transactions_total",
            "Total transaction records written to the ledger",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_total.clone()))
            .expect("metric registration");

        let transfers_total = IntCounter::new(
            "transfers_total",
            "Total completed peer-to-peer transfers",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfers_total.clone()))
            .expect("metric registration");

        let rejected_operations_total = IntCounter::new(
            "rejected_operations_total",
            "Total ledger operations rejected by a precondition check",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_operations_total.clone()))
            .expect("metric registration");

        let push_messages_sent_total = IntCounter::new(
            "push_messages_sent_total",
            "Total push messages handed to the gateway",
        )
        .expect("metric creation");
        registry
            .register(Box::new(push_messages_sent_total.clone()))
            .expect("metric registration");

        let push_batches_total = IntCounter::new(
            "push_batches_total",
            "Total push-gateway batch requests issued",
        )
        .expect("metric creation");
        registry
            .register(Box::new(push_batches_total.clone()))
            .expect("metric registration");

        let ws_clients = IntGauge::new(
            "ws_clients",
            "Currently connected WebSocket event subscribers",
        )
        .expect("metric creation");
        registry
            .register(Box::new(ws_clients.clone()))
            .expect("metric registration");

        let user_count = IntGauge::new("user_count", "Number of registered users")
            .expect("metric creation");
        registry
            .register(Box::new(user_count.clone()))
            .expect("metric registration");

        let op_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "op_latency_seconds",
                "End-to-end ledger operation latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(op_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            transactions_total,
            transfers_total,
            rejected_operations_total,
            push_messages_sent_total,
            push_batches_total,
            ws_clients,
            user_count,
            op_latency_seconds,
        }
    }

    /// Renders every registered family in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<ServiceMetrics>;

/// Axum handler behind `GET /metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("metrics encoding failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_includes_registered_families() {
        let metrics = ServiceMetrics::new();
        metrics.transactions_total.inc();
        metrics.ws_clients.set(3);

        let body = metrics.encode().expect("encode");
        assert!(body.contains("souk_transactions_total"));
        assert!(body.contains("souk_ws_clients 3"));
    }
}

//! # Prometheus Metrics
//!
//! Exposes operational metrics for the hosted vault. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use yieldvault::VaultSnapshot;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    /// Committed vault operations, labelled by kind
    /// (deposit, mint, withdraw, redeem, transfer).
    pub operations_total: IntCounterVec,
    /// Vault operations rejected or rolled back.
    pub failed_operations_total: IntCounter,
    /// Assets under management: idle custody plus venue position.
    pub total_assets: IntGauge,
    /// Shares outstanding.
    pub total_shares: IntGauge,
    /// Underlying held in custody rather than deployed.
    pub idle_assets: IntGauge,
    /// Latency of vault writes, in seconds.
    pub operation_latency_seconds: Histogram,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("yieldvault".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Committed vault operations by kind"),
            &["op"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let failed_operations_total = IntCounter::new(
            "failed_operations_total",
            "Vault operations that were rejected or rolled back",
        )?;
        registry.register(Box::new(failed_operations_total.clone()))?;

        let total_assets = IntGauge::new("total_assets", "Assets under management")?;
        registry.register(Box::new(total_assets.clone()))?;

        let total_shares = IntGauge::new("total_shares", "Vault shares outstanding")?;
        registry.register(Box::new(total_shares.clone()))?;

        let idle_assets = IntGauge::new("idle_assets", "Underlying held undeployed in custody")?;
        registry.register(Box::new(idle_assets.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Latency of vault writes in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            failed_operations_total,
            total_assets,
            total_shares,
            idle_assets,
            operation_latency_seconds,
        })
    }

    /// Refreshes the gauges from a vault snapshot.
    pub fn observe(&self, snapshot: &VaultSnapshot) {
        self.total_assets.set(gauge_value(snapshot.total_assets));
        self.total_shares.set(gauge_value(snapshot.total_shares));
        self.idle_assets.set(gauge_value(snapshot.idle_assets));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge_value(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
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
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

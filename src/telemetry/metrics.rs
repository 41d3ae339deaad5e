//! Prometheus metrics

use crate::risk::RiskMetrics;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Per-account gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current leverage
    Leverage,
    /// Equity over margin used
    MarginRatio,
    /// Drawdown from peak equity
    Drawdown,
    /// Current equity
    Equity,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Leverage => "risk_current_leverage",
            GaugeMetric::MarginRatio => "risk_current_margin_ratio",
            GaugeMetric::Drawdown => "risk_current_drawdown",
            GaugeMetric::Equity => "risk_current_equity",
        }
    }
}

/// Install the Prometheus exporter, serving `/metrics` on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Set a per-account gauge
pub fn set_gauge(metric: GaugeMetric, account_id: &str, value: f64) {
    gauge!(metric.name(), "account" => account_id.to_string()).set(value);
}

/// Publish the headline gauges for one account
pub fn record_account_metrics(metrics: &RiskMetrics) {
    let account = metrics.account_id.as_str();
    set_gauge(GaugeMetric::Leverage, account, metrics.leverage);
    if let Some(ratio) = metrics.margin_ratio {
        set_gauge(GaugeMetric::MarginRatio, account, ratio);
    }
    set_gauge(GaugeMetric::Drawdown, account, metrics.drawdown_max);
    set_gauge(GaugeMetric::Equity, account, metrics.total_equity);
}

/// Record a completed pre-trade check
pub fn record_order_check(approved: bool, elapsed: Duration) {
    let result = if approved { "approved" } else { "rejected" };
    counter!("risk_order_checks_total", "result" => result).increment(1);
    histogram!("risk_order_check_duration_us").record(elapsed.as_secs_f64() * 1_000_000.0);
}

/// Record why an order was rejected
pub fn record_order_rejected(reason: &str) {
    counter!("risk_orders_rejected_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_violation(policy_type: &'static str) {
    counter!("risk_violations_total", "policy_type" => policy_type).increment(1);
}

pub fn record_emergency_stop() {
    counter!("risk_emergency_stops_total").increment(1);
}

pub fn set_emergency_active(active: bool) {
    gauge!("risk_emergency_stop_active").set(if active { 1.0 } else { 0.0 });
}

pub fn record_alert_published(topic: &str) {
    counter!("risk_alerts_published_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_alert_deduplicated() {
    counter!("risk_alerts_deduplicated_total").increment(1);
}

pub fn record_alert_dropped() {
    counter!("risk_alerts_dropped_total").increment(1);
}

pub fn record_breaker_trip() {
    counter!("risk_circuit_breaker_trips_total").increment(1);
}

/// Record which cache tier answered a lookup
pub fn record_cache_lookup(kind: &'static str, tier: &'static str) {
    counter!("risk_cache_lookups_total", "kind" => kind, "tier" => tier).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_names_are_prefixed() {
        for metric in [
            GaugeMetric::Leverage,
            GaugeMetric::MarginRatio,
            GaugeMetric::Drawdown,
            GaugeMetric::Equity,
        ] {
            assert!(metric.name().starts_with("risk_current_"));
        }
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_order_check(true, Duration::from_micros(120));
        record_cache_lookup("price", "local");
        record_account_metrics(&RiskMetrics::default());
    }
}

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on `0.0.0.0:port`.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are automatically exported at /metrics.
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}

// ── Poll metrics ─────────────────────────────────────────────────

/// `outcome` is one of `applied`, `stale`, `busy`, `failed`.
pub fn record_poll_tick(outcome: &'static str) {
    counter!("poll_ticks_total", "outcome" => outcome).increment(1);
}

pub fn record_fetch_latency_ms(latency_ms: f64) {
    histogram!("poll_fetch_latency_ms").record(latency_ms);
}

pub fn record_fetch_error(kind: &'static str) {
    counter!("poll_fetch_errors_total", "kind" => kind).increment(1);
}

pub fn record_stale_snapshot() {
    counter!("snapshots_stale_total").increment(1);
}

// ── Reconcile metrics ────────────────────────────────────────────

pub fn record_reconcile(panel: &str, action: &'static str, records: usize) {
    if records == 0 {
        return;
    }
    counter!("reconcile_records_total", "panel" => panel.to_string(), "action" => action)
        .increment(records as u64);
}

pub fn record_highlights(panel: &str, highlighted: usize) {
    if highlighted == 0 {
        return;
    }
    counter!("reconcile_highlights_total", "panel" => panel.to_string())
        .increment(highlighted as u64);
}

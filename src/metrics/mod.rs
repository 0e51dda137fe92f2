//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Batch outcomes
//! - Nonce rollbacks
//! - Gas prices paid
//! - Finality latency

use crate::distribution::FailureKind;
use crate::error::DistributorResult;

use ethers::types::U256;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::path::Path;
use tracing::info;

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: Counter = register_counter!(
        "distributor_transactions_submitted_total",
        "Total transactions accepted into the pending pool"
    ).unwrap();

    pub static ref BATCHES_CONFIRMED: Counter = register_counter!(
        "distributor_batches_confirmed_total",
        "Total batches confirmed past the confirmation depth"
    ).unwrap();

    pub static ref BATCHES_FAILED: CounterVec = register_counter_vec!(
        "distributor_batches_failed_total",
        "Total batches failed by failure kind",
        &["kind"]
    ).unwrap();

    pub static ref NONCE_ROLLBACKS: Counter = register_counter!(
        "distributor_nonce_rollbacks_total",
        "Total nonce reservations released after rejection"
    ).unwrap();

    pub static ref GAS_PRICE: Gauge = register_gauge!(
        "distributor_gas_price_gwei",
        "Gas price of the most recent estimate"
    ).unwrap();

    pub static ref FINALITY_LATENCY: Histogram = register_histogram!(
        "distributor_finality_latency_seconds",
        "Time from submission to confirmation",
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Render the default registry in the text exposition format
pub fn render() -> DistributorResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    String::from_utf8(buffer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
}

/// Write all metrics to `path` for a textfile collector
pub fn write_textfile(path: &Path) -> DistributorResult<()> {
    std::fs::write(path, render()?)?;
    info!("Metrics written to {}", path.display());
    Ok(())
}

// Helper functions to record metrics

pub fn record_tx_submitted() {
    TX_SUBMITTED.inc();
}

pub fn record_batch_confirmed(latency_secs: f64) {
    BATCHES_CONFIRMED.inc();
    FINALITY_LATENCY.observe(latency_secs);
}

pub fn record_batch_failed(kind: FailureKind) {
    BATCHES_FAILED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_nonce_rollback() {
    NONCE_ROLLBACKS.inc();
}

pub fn record_gas_price(price_wei: U256) {
    let gwei = ethers::utils::format_units(price_wei, "gwei")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or_default();
    GAS_PRICE.set(gwei);
}

//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission and confirmation
//! - Account sequence
//! - Key-sync cycle outcomes

use crate::error::AgentResult;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{info, warn};

lazy_static! {
    // Transaction metrics
    pub static ref TX_EVENTS: CounterVec = register_counter_vec!(
        "keysync_transactions_total",
        "Transactions by outcome (submitted, rejected, confirmed, execution_failed)",
        &["outcome"]
    ).unwrap();

    pub static ref TX_ERRORS: CounterVec = register_counter_vec!(
        "keysync_transaction_errors_total",
        "Submission errors by kind",
        &["kind"]
    ).unwrap();

    pub static ref CONFIRMATION_LATENCY: Histogram = register_histogram!(
        "keysync_confirmation_latency_seconds",
        "Time from broadcast to execution result",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    pub static ref POLL_ATTEMPTS: CounterVec = register_counter_vec!(
        "keysync_confirmation_polls_total",
        "Transaction lookups made while waiting for confirmation",
        &[]
    ).unwrap();

    // Account metrics
    pub static ref ACCOUNT_SEQUENCE: Gauge = register_gauge!(
        "keysync_account_sequence",
        "Last sequence reported by the ledger for the agent account"
    ).unwrap();

    // Cycle metrics
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "keysync_cycles_total",
        "Key-sync cycles by outcome and failing step",
        &["outcome", "step"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECKS: CounterVec = register_counter_vec!(
        "keysync_health_checks_total",
        "Readiness checks by result",
        &["result"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> AgentResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> (StatusCode, String) {
    match render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// Helper functions to record metrics

pub fn record_tx_submitted() {
    TX_EVENTS.with_label_values(&["submitted"]).inc();
}

pub fn record_tx_rejected() {
    TX_EVENTS.with_label_values(&["rejected"]).inc();
}

pub fn record_tx_confirmed() {
    TX_EVENTS.with_label_values(&["confirmed"]).inc();
}

pub fn record_tx_execution_failed() {
    TX_EVENTS.with_label_values(&["execution_failed"]).inc();
}

pub fn record_tx_error(kind: &str) {
    TX_ERRORS.with_label_values(&[kind]).inc();
}

pub fn record_confirmation_latency(latency_secs: f64) {
    CONFIRMATION_LATENCY.observe(latency_secs);
}

pub fn record_poll_attempt() {
    POLL_ATTEMPTS.with_label_values(&[]).inc();
}

pub fn record_account_sequence(sequence: u64) {
    ACCOUNT_SEQUENCE.set(sequence as f64);
}

pub fn record_cycle_success() {
    CYCLES.with_label_values(&["success", ""]).inc();
}

pub fn record_cycle_failure(step: &str) {
    CYCLES.with_label_values(&["failure", step]).inc();
}

pub fn record_health_check(ready: bool) {
    let result = if ready { "ready" } else { "unavailable" };
    HEALTH_CHECKS.with_label_values(&[result]).inc();
}

//! Prometheus metrics
//!
//! Process-wide registry shared by the API server and the replicator.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    /// Balance mutations by kind and outcome
    pub static ref LEDGER_TRANSACTIONS_TOTAL: CounterVec = register_counter_vec!(
        "ledger_transactions_total",
        "Balance mutation requests by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap();

    /// Publish-after-commit results
    pub static ref LEDGER_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "ledger_publish_total",
        "Transaction events published after commit",
        &["status"]
    )
    .unwrap();

    /// Replicator messages by terminal state
    pub static ref REPLICATOR_MESSAGES_TOTAL: CounterVec = register_counter_vec!(
        "history_replicator_messages_total",
        "Queue messages processed by the history replicator",
        &["outcome"]
    )
    .unwrap();

    pub static ref REPLICATOR_PERSIST_DURATION: Histogram = register_histogram!(
        "history_replicator_persist_duration_seconds",
        "History store upsert duration in seconds"
    )
    .unwrap();

    pub static ref REPLICATOR_ACK_FAILURES_TOTAL: Counter = register_counter!(
        "history_replicator_ack_failures_total",
        "Messages whose ack, nak or term could not be sent"
    )
    .unwrap();

    pub static ref REPLICATOR_RECEIVE_ERRORS_TOTAL: Counter = register_counter!(
        "history_replicator_receive_errors_total",
        "Errors returned by the queue while waiting for a message"
    )
    .unwrap();
}

/// Count one balance mutation request
pub fn record_transaction(kind: &str, outcome: &str) {
    LEDGER_TRANSACTIONS_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}

/// Encode every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_touched_metrics() {
        LEDGER_PUBLISH_TOTAL.with_label_values(&["success"]).inc_by(0.0);
        REPLICATOR_ACK_FAILURES_TOTAL.inc_by(0.0);

        let body = render().unwrap();
        assert!(body.contains("ledger_publish_total"));
        assert!(body.contains("history_replicator_ack_failures_total"));
    }
}

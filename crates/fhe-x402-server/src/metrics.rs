use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use std::sync::LazyLock;

/// Gated requests by route pattern and final status. Labelled with the
/// configured pattern, never the raw path, to keep cardinality bounded.
pub static REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_server_requests_total",
        "Gated HTTP requests by route pattern and status",
        &["endpoint", "status"]
    )
    .unwrap()
});

/// Payment attempts by outcome: the reason name on rejection, `settled` on success.
pub static PAYMENT_ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_server_payment_attempts_total",
        "Payment attempts by outcome",
        &["result"]
    )
    .unwrap()
});

pub fn record_request(endpoint: &str, status: u16) {
    let status = status.to_string();
    REQUESTS
        .with_label_values(&[endpoint, status.as_str()])
        .inc();
}

pub fn record_attempt(result: &str) {
    PAYMENT_ATTEMPTS.with_label_values(&[result]).inc();
}

pub fn metrics_output() -> String {
    let mut buffer = Vec::new();
    if TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

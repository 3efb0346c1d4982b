use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

pub static VERIFY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_verify_total",
        "Verification requests by outcome (valid, invalid, error)",
        &["result"]
    )
    .unwrap()
});

pub static SETTLE_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_settle_total",
        "Settlement requests by outcome (success, rejected, error)",
        &["result"]
    )
    .unwrap()
});

// Settlement spans a mined transaction plus a decryption round trip.
pub static SETTLE_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "x402_facilitator_settle_duration_seconds",
        "Settlement latency in seconds, including amount decryption",
        &["result"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 90.0]
    )
    .unwrap()
});

pub static HMAC_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "x402_facilitator_hmac_failures_total",
        "Rejected facilitator calls by HMAC failure (missing, invalid)",
        &["reason"]
    )
    .unwrap()
});

pub fn record_verify(result: &str) {
    VERIFY_REQUESTS.with_label_values(&[result]).inc();
}

pub fn record_settle(result: &str, elapsed_secs: f64) {
    SETTLE_REQUESTS.with_label_values(&[result]).inc();
    SETTLE_LATENCY
        .with_label_values(&[result])
        .observe(elapsed_secs);
}

/// Render the default registry in the Prometheus text format.
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

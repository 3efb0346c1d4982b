//! x402 resource server: gates HTTP endpoints behind FHE payments.
//!
//! A protected route answers HTTP 402 with its
//! [`PaymentRequirements`](x402::PaymentRequirements) until the client
//! presents an `X-PAYMENT` header. The payment is verified through the
//! facilitator, the resource runs, and only then is the payment settled.
//! The resource output is released with an `X-PAYMENT-RESPONSE` receipt, or
//! discarded if settlement fails.
//!
//! # Modules
//!
//! - [`config`] — gateway settings and route registration ([`PaymentConfigBuilder`])
//! - [`middleware`] — the payment gate ([`PaymentGate::process`])
//! - [`metrics`] — Prometheus counters for gated requests and payment outcomes

pub mod config;
pub mod metrics;
pub mod middleware;

pub use config::{
    PaymentConfig, PaymentConfigBuilder, PaymentGateConfig, RoutePattern, RoutePaymentConfig,
};
pub use middleware::{payment_required_body, resource_url, PaymentGate};

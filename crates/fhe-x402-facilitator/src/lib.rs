//! x402 facilitator: verifies FHE payment authorizations and settles them on
//! the confidential token.
//!
//! Resource servers call it over HMAC-authenticated HTTP. Verification and
//! settlement logic live in the core [`x402`] crate; this crate provides the
//! HTTP surface, configuration and metrics.
//!
//! # Modules
//!
//! - [`config`] — environment configuration
//! - [`routes`] — HTTP endpoints (verify, settle, supported, health, metrics)
//! - [`state`] — shared [`AppState`](state::AppState), generic over the facilitator
//! - [`metrics`] — Prometheus metrics for verification and settlement

pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;

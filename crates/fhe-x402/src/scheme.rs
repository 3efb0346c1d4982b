//! Core trait definitions for the three-party payment model.
//!
//! - [`SchemeClient`] — client-side: creates signed payment payloads
//! - [`SchemeFacilitator`] — facilitator-side: verifies and settles payments
//! - [`SchemeServer`] — server-side: parses prices into on-chain amounts
//!
//! See [`crate::scheme_server::FheSchemeServer`] and
//! [`crate::scheme_facilitator::FheSchemeFacilitator`] for the FHE implementations.

use std::future::Future;

use alloy::primitives::{Address, U256};

use crate::error::X402Error;
use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, SupportedKind, VerifyResponse};

/// Client-side scheme: creates signed payment payloads.
pub trait SchemeClient: Send + Sync {
    /// Create a signed payment payload for the given requirements.
    fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<PaymentPayload, X402Error>> + Send;
}

/// Facilitator-side scheme: verifies and settles payments.
///
/// Rejections are values (`is_valid: false` / `success: false`); `Err` is
/// reserved for failures of the facilitator itself.
pub trait SchemeFacilitator: Send + Sync {
    /// Verify a payment payload against the requirements.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<VerifyResponse, X402Error>> + Send;

    /// Settle a payment on the ledger. Re-verifies first; never submits an
    /// authorization that fails verification.
    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<SettleResponse, X402Error>> + Send;

    /// The `(scheme, network)` pairs this facilitator serves.
    fn supported(&self) -> Vec<SupportedKind>;

    /// Ledger liveness: latest block number.
    fn health_check(&self) -> impl Future<Output = Result<u64, X402Error>> + Send;
}

/// Server-side scheme: parses prices into on-chain amounts.
pub trait SchemeServer: Send + Sync {
    /// Parse a price (`"$0.001"` or a raw smallest-unit integer) into an amount and asset.
    fn parse_price(&self, price: &str) -> Result<(U256, Address), X402Error>;
}

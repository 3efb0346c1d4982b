use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::reason::ErrorReason;

/// Response from the facilitator's `/verify` endpoint.
///
/// `payer` is populated on rejections too, for audit logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,
    pub payer: Address,
}

impl VerifyResponse {
    pub fn valid(payer: Address) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer,
        }
    }

    pub fn invalid(reason: ErrorReason, payer: Address) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

/// Response from the facilitator's `/settle` endpoint. Also the payload of
/// the `X-PAYMENT-RESPONSE` receipt header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    pub payer: Address,
    /// Transaction hash, or empty when no transaction was produced.
    pub transaction: String,
    pub network: String,
    /// Decrypted amount actually moved. Absent when it could not be observed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::payment::decimal::option"
    )]
    pub transferred_amount: Option<U256>,
}

impl SettleResponse {
    pub fn settled(
        payer: Address,
        transaction: String,
        network: String,
        transferred_amount: Option<U256>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            payer,
            transaction,
            network,
            transferred_amount,
        }
    }

    pub fn failed(
        reason: ErrorReason,
        payer: Address,
        transaction: Option<String>,
        network: String,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction: transaction.unwrap_or_default(),
            network,
            transferred_amount: None,
        }
    }
}

/// One `(scheme, network)` pair a facilitator can verify and settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
}

/// Response from the facilitator's `/supported` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
}

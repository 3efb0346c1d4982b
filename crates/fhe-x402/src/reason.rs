//! Stable rejection taxonomy shared by verification, settlement and the
//! middleware. Each reason serialises as its variant name and never changes
//! across protocol versions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    PaymentRequired,
    MalformedPayload,
    UnsupportedScheme,
    InvalidNetwork,
    AuthorizationNotYetValid,
    AuthorizationExpired,
    NonceAlreadyUsed,
    InvalidSignature,
    RecipientMismatch,
    InsufficientBalance,
    PartialTransfer,
    TransactionReverted,
    UnknownError,
}

impl ErrorReason {
    pub const ALL: [ErrorReason; 13] = [
        ErrorReason::PaymentRequired,
        ErrorReason::MalformedPayload,
        ErrorReason::UnsupportedScheme,
        ErrorReason::InvalidNetwork,
        ErrorReason::AuthorizationNotYetValid,
        ErrorReason::AuthorizationExpired,
        ErrorReason::NonceAlreadyUsed,
        ErrorReason::InvalidSignature,
        ErrorReason::RecipientMismatch,
        ErrorReason::InsufficientBalance,
        ErrorReason::PartialTransfer,
        ErrorReason::TransactionReverted,
        ErrorReason::UnknownError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::PaymentRequired => "PaymentRequired",
            ErrorReason::MalformedPayload => "MalformedPayload",
            ErrorReason::UnsupportedScheme => "UnsupportedScheme",
            ErrorReason::InvalidNetwork => "InvalidNetwork",
            ErrorReason::AuthorizationNotYetValid => "AuthorizationNotYetValid",
            ErrorReason::AuthorizationExpired => "AuthorizationExpired",
            ErrorReason::NonceAlreadyUsed => "NonceAlreadyUsed",
            ErrorReason::InvalidSignature => "InvalidSignature",
            ErrorReason::RecipientMismatch => "RecipientMismatch",
            ErrorReason::InsufficientBalance => "InsufficientBalance",
            ErrorReason::PartialTransfer => "PartialTransfer",
            ErrorReason::TransactionReverted => "TransactionReverted",
            ErrorReason::UnknownError => "UnknownError",
        }
    }

    /// Human-readable description, for logs and client-facing messages.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorReason::PaymentRequired => "Payment required",
            ErrorReason::MalformedPayload => "Payment header could not be decoded",
            ErrorReason::UnsupportedScheme => "Payment scheme is not supported",
            ErrorReason::InvalidNetwork => "Payment network does not match",
            ErrorReason::AuthorizationNotYetValid => "Authorization not yet valid",
            ErrorReason::AuthorizationExpired => "Authorization expired",
            ErrorReason::NonceAlreadyUsed => "Nonce already used",
            ErrorReason::InvalidSignature => "Invalid signature",
            ErrorReason::RecipientMismatch => "Recipient mismatch",
            ErrorReason::InsufficientBalance => "Insufficient balance",
            ErrorReason::PartialTransfer => "Transferred amount below required",
            ErrorReason::TransactionReverted => "Settlement transaction reverted",
            ErrorReason::UnknownError => "Payment could not be completed",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorReason::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown error reason: '{s}'"))
    }
}

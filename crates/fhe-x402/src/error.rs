use thiserror::Error;

/// Failures of the payment machinery itself.
///
/// A payment that is merely unacceptable is not an error: it comes back as a
/// [`VerifyResponse`](crate::VerifyResponse) or
/// [`SettleResponse`](crate::SettleResponse) carrying an
/// [`ErrorReason`](crate::ErrorReason).
#[derive(Debug, Error)]
pub enum X402Error {
    /// Signing failed, or a signature could not be parsed or recovered.
    #[error("signature error: {0}")]
    SignatureError(String),

    /// The ledger RPC failed or answered something unexpected.
    #[error("chain error: {0}")]
    ChainError(String),

    /// Payment requirements the client cannot turn into an authorization.
    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    /// A header or request body that does not decode into the expected type.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Encryption or decryption service failure.
    #[error("fhe service error: {0}")]
    DecryptionError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    /// Transport failure talking to a facilitator, relayer or resource.
    #[error("http error: {0}")]
    HttpError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl From<base64::DecodeError> for X402Error {
    fn from(e: base64::DecodeError) -> Self {
        X402Error::MalformedPayload(format!("invalid base64: {e}"))
    }
}

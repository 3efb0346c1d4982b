//! Secret comparison helpers shared by the facilitator and resource server.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two secrets without leaking their content or length through timing.
/// Both sides are hashed to fixed-size digests first.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Check an `Authorization: Bearer <token>` header value against `expected`.
pub fn bearer_matches(header_value: Option<&str>, expected: &[u8]) -> bool {
    let provided = header_value
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    !provided.is_empty() && constant_time_eq(provided.as_bytes(), expected)
}

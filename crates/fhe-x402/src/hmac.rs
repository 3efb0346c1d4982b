//! HMAC-SHA256 request authentication between resource servers and the facilitator.

use alloy::hex;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC of the request body.
pub const FACILITATOR_AUTH_HEADER: &str = "X-Facilitator-Auth";

fn keyed(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length")
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn compute_hmac(secret: &[u8], body: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature. Undecodable hex is compared
/// against zeros so it takes the same path as a wrong signature.
pub fn verify_hmac(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = keyed(secret);
    mac.update(body);
    let expected = hex::decode(signature.trim()).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}

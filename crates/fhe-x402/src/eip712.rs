//! EIP-712 typed-data signing, signature verification, and nonce generation.
//!
//! The signing context of an authorization is rebuilt from the requirements:
//! domain name and version come from `requirements.extra`, the chain id from
//! `requirements.network`, and the verifying contract is the token (`asset`).

use std::borrow::Cow;

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::{networks, Authorization, ChainConfig, PaymentRequirements, X402Error};
use crate::TransferWithAuthorization;

/// Build the EIP-712 domain for a payment against the given requirements.
/// Falls back to the chain config's domain name/version when `extra` is absent.
pub fn payment_domain(
    requirements: &PaymentRequirements,
    config: &ChainConfig,
) -> Result<Eip712Domain, X402Error> {
    let chain_id = networks::chain_id(&requirements.network)?;
    let (name, version) = match &requirements.extra {
        Some(extra) => (extra.name.clone(), extra.version.clone()),
        None => (
            config.eip712_domain_name.clone(),
            config.eip712_domain_version.clone(),
        ),
    };
    Ok(Eip712Domain {
        name: Some(Cow::Owned(name)),
        version: Some(Cow::Owned(version)),
        chain_id: Some(U256::from(chain_id)),
        verifying_contract: Some(requirements.asset),
        salt: None,
    })
}

/// The typed struct that is hashed and signed for an authorization.
pub fn typed_authorization(auth: &Authorization) -> TransferWithAuthorization {
    TransferWithAuthorization {
        from: auth.from,
        to: auth.to,
        encryptedValueHandle: auth.encrypted_value_handle,
        inputProof: auth.input_proof.clone(),
        validAfter: auth.valid_after,
        validBefore: auth.valid_before,
        nonce: auth.nonce,
    }
}

/// Compute the EIP-712 signing hash of an authorization under `domain`.
pub fn signing_hash(auth: &Authorization, domain: &Eip712Domain) -> B256 {
    typed_authorization(auth).eip712_signing_hash(domain)
}

/// secp256k1 curve order N / 2 — signatures with s > this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the signer of an authorization.
/// Rejects malformed lengths and high-s signatures (EIP-2).
pub fn recover_signer(
    auth: &Authorization,
    signature_bytes: &[u8],
    domain: &Eip712Domain,
) -> Result<Address, X402Error> {
    if signature_bytes.len() != 65 {
        return Err(X402Error::SignatureError(format!(
            "signature must be 65 bytes, got {}",
            signature_bytes.len()
        )));
    }

    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| X402Error::SignatureError(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(X402Error::SignatureError(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    let hash = signing_hash(auth, domain);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| X402Error::SignatureError(format!("recovery failed: {e}")))
}

/// True if `signature_bytes` is a valid signature of `auth` by `expected_signer`.
pub fn verify_signature(
    auth: &Authorization,
    signature_bytes: &[u8],
    domain: &Eip712Domain,
    expected_signer: Address,
) -> bool {
    match recover_signer(auth, signature_bytes, domain) {
        Ok(recovered) => recovered == expected_signer,
        Err(e) => {
            tracing::debug!(error = %e, "signature verification error");
            false
        }
    }
}

/// Generate a random 32-byte nonce (keccak256 of 32 random bytes).
pub fn random_nonce() -> B256 {
    use alloy::primitives::keccak256;
    let mut bytes = [0u8; 32];
    rand::fill(&mut bytes);
    keccak256(bytes)
}

use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::eip712::{payment_domain, random_nonce, signing_hash};
use crate::fhe::Encryptor;
use crate::{
    Authorization, ChainConfig, FhePaymentData, PaymentPayload, PaymentRequirements,
    SchemeClient, X402Error,
};

/// Client-side scheme implementation: encrypts the amount and signs an
/// EIP-712 `TransferWithAuthorization` over the resulting handle.
pub struct FheSchemeClient<E> {
    signer: PrivateKeySigner,
    encryptor: E,
    config: ChainConfig,
}

impl<E: Encryptor> FheSchemeClient<E> {
    pub fn new(signer: PrivateKeySigner, encryptor: E) -> Self {
        Self {
            signer,
            encryptor,
            config: ChainConfig::default(),
        }
    }

    pub fn with_chain_config(signer: PrivateKeySigner, encryptor: E, config: ChainConfig) -> Self {
        Self {
            signer,
            encryptor,
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl<E: Encryptor> SchemeClient for FheSchemeClient<E> {
    async fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, X402Error> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| X402Error::ConfigError(format!("system time error: {e}")))?
            .as_secs();

        let valid_before = now
            .checked_add(requirements.max_timeout_seconds)
            .ok_or_else(|| {
                X402Error::InvalidPayment(format!(
                    "maxTimeoutSeconds {} overflows validBefore",
                    requirements.max_timeout_seconds
                ))
            })?;

        let from = self.signer.address();
        let encrypted = self
            .encryptor
            .encrypt(requirements.max_amount_required, requirements.asset, from)
            .await?;

        let authorization = Authorization {
            from,
            to: requirements.pay_to,
            encrypted_value_handle: encrypted.handle,
            input_proof: encrypted.input_proof,
            valid_after: U256::from(now.saturating_sub(60)),
            valid_before: U256::from(valid_before),
            nonce: random_nonce(),
        };

        let domain = payment_domain(requirements, &self.config)?;
        let sig = self
            .signer
            .sign_hash_sync(&signing_hash(&authorization, &domain))
            .map_err(|e| X402Error::SignatureError(format!("signing failed: {e}")))?;

        Ok(PaymentPayload {
            x402_version,
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            payload: FhePaymentData {
                signature: Bytes::from(sig.as_bytes().to_vec()),
                authorization,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eip712::verify_signature;
    use crate::fhe::EncryptedInput;
    use crate::{TokenDomain, DEFAULT_TOKEN, SCHEME_NAME, SEPOLIA_NETWORK};
    use alloy::primitives::B256;

    struct EchoEncryptor;

    impl Encryptor for EchoEncryptor {
        async fn encrypt(
            &self,
            value: U256,
            _contract: Address,
            _user: Address,
        ) -> Result<EncryptedInput, X402Error> {
            Ok(EncryptedInput {
                handle: B256::from(value),
                input_proof: Bytes::from(vec![0x01; 8]),
            })
        }
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_NAME.to_string(),
            network: SEPOLIA_NETWORK.to_string(),
            max_amount_required: U256::from(1000u64),
            resource: "http://localhost/weather".to_string(),
            description: None,
            mime_type: None,
            pay_to: Address::repeat_byte(0x22),
            max_timeout_seconds: 30,
            asset: DEFAULT_TOKEN,
            extra: Some(TokenDomain {
                name: "ConfidentialUSDC".to_string(),
                version: "1".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_create_payment_payload() {
        let signer = PrivateKeySigner::random();
        let client = FheSchemeClient::new(signer.clone(), EchoEncryptor);
        let req = requirements();

        let payload = client.create_payment_payload(1, &req).await.unwrap();
        let auth = &payload.payload.authorization;

        assert_eq!(payload.x402_version, 1);
        assert_eq!(payload.scheme, SCHEME_NAME);
        assert_eq!(auth.from, signer.address());
        assert_eq!(auth.to, req.pay_to);
        assert_eq!(auth.encrypted_value_handle, B256::from(U256::from(1000u64)));
        assert!(auth.valid_before > auth.valid_after);
        assert_eq!(payload.payload.signature.len(), 65);

        let domain = payment_domain(&req, &ChainConfig::default()).unwrap();
        assert!(verify_signature(
            auth,
            &payload.payload.signature,
            &domain,
            signer.address()
        ));
    }

    #[tokio::test]
    async fn test_oversized_timeout_is_rejected() {
        let client = FheSchemeClient::new(PrivateKeySigner::random(), EchoEncryptor);
        let mut req = requirements();
        req.max_timeout_seconds = u64::MAX;

        let err = client.create_payment_payload(1, &req).await.unwrap_err();
        assert!(matches!(err, X402Error::InvalidPayment(_)));
    }

    #[test]
    fn test_address() {
        let signer = PrivateKeySigner::random();
        let client = FheSchemeClient::new(signer.clone(), EchoEncryptor);
        assert_eq!(client.address(), signer.address());
    }
}

//! Header codec: JSON then standard base64.
//!
//! Decoding either yields a fully populated value or fails with
//! [`X402Error::MalformedPayload`]; there is no partial result.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{PaymentPayload, SettleResponse, X402Error};

fn encode<T: Serialize>(value: &T) -> Result<String, X402Error> {
    let json = serde_json::to_vec(value)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

fn decode<T: DeserializeOwned>(header_value: &str) -> Result<T, X402Error> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(header_value.trim())?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::MalformedPayload(format!("invalid JSON payload: {e}")))
}

/// Encode a payment payload for the `X-PAYMENT` header.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, X402Error> {
    encode(payload)
}

/// Decode an `X-PAYMENT` header value.
pub fn decode_payment(header_value: &str) -> Result<PaymentPayload, X402Error> {
    decode(header_value)
}

/// Encode a settlement receipt for the `X-PAYMENT-RESPONSE` header.
pub fn encode_settlement(settlement: &SettleResponse) -> Result<String, X402Error> {
    encode(settlement)
}

/// Decode an `X-PAYMENT-RESPONSE` header value.
pub fn decode_settlement(header_value: &str) -> Result<SettleResponse, X402Error> {
    decode(header_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Authorization, ErrorReason, FhePaymentData};
    use alloy::primitives::{Address, Bytes, B256, U256};

    fn sample_payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: 1,
            scheme: "fhe-transfer".to_string(),
            network: "eip155:11155111".to_string(),
            payload: FhePaymentData {
                signature: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
                authorization: Authorization {
                    from: Address::repeat_byte(0x11),
                    to: Address::repeat_byte(0x22),
                    encrypted_value_handle: B256::repeat_byte(0x33),
                    input_proof: Bytes::from(vec![0x01, 0x02, 0x03]),
                    valid_after: U256::ZERO,
                    valid_before: U256::MAX,
                    nonce: B256::repeat_byte(0x44),
                },
            },
        }
    }

    #[test]
    fn test_payment_roundtrip_with_max_width_numbers() {
        let payload = sample_payload();
        let encoded = encode_payment(&payload).unwrap();
        let decoded = decode_payment(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_numbers_travel_as_strings() {
        let encoded = encode_payment(&sample_payload()).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let auth = &json["payload"]["authorization"];
        assert_eq!(auth["validAfter"], "0");
        assert_eq!(auth["validBefore"], U256::MAX.to_string());
        assert_eq!(json["x402Version"], 1);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let err = decode_payment("not-valid-base64!!!").unwrap_err();
        assert!(matches!(err, X402Error::MalformedPayload(_)));
        assert!(err.to_string().contains("invalid base64"));
    }

    #[test]
    fn test_decode_invalid_json() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"this is not json");
        let err = decode_payment(&encoded).unwrap_err();
        assert!(matches!(err, X402Error::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_missing_field_fails_whole_payload() {
        let mut json = serde_json::to_value(sample_payload()).unwrap();
        json["payload"]["authorization"]
            .as_object_mut()
            .unwrap()
            .remove("nonce");
        let encoded = base64::engine::general_purpose::STANDARD.encode(json.to_string());
        assert!(matches!(
            decode_payment(&encoded),
            Err(X402Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_numeric_timestamp() {
        let mut json = serde_json::to_value(sample_payload()).unwrap();
        json["payload"]["authorization"]["validBefore"] = serde_json::json!(1_700_000_000u64);
        let encoded = base64::engine::general_purpose::STANDARD.encode(json.to_string());
        assert!(decode_payment(&encoded).is_err());
    }

    #[test]
    fn test_settlement_receipt_roundtrip() {
        let receipt = SettleResponse::failed(
            ErrorReason::PartialTransfer,
            Address::repeat_byte(0x11),
            Some("0xfeed".to_string()),
            "eip155:11155111".to_string(),
        );
        let encoded = encode_settlement(&receipt).unwrap();
        assert_eq!(decode_settlement(&encoded).unwrap(), receipt);
    }
}

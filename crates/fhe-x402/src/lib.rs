//! x402 payment protocol with FHE-encrypted amounts.
//!
//! Implements HTTP 402 pay-per-request where the payment amount never appears
//! in plaintext: the client signs an EIP-712 authorization over an encrypted
//! value handle, and a confidential token contract moves the funds.
//!
//! # Three-party model
//!
//! - **Client** ([`FheSchemeClient`]) — encrypts the amount and signs the authorization
//! - **Server** ([`FheSchemeServer`]) — gates endpoints, returns 402 with requirements
//! - **Facilitator** ([`FheSchemeFacilitator`]) — verifies signatures, settles on-chain,
//!   and decrypts the amount actually transferred
//!
//! # Quick example (client)
//!
//! ```no_run
//! use alloy::primitives::{Address, Bytes, B256, U256};
//! use alloy::signers::local::PrivateKeySigner;
//! use x402::fhe::{EncryptedInput, Encryptor};
//! use x402::{FheSchemeClient, X402Client, X402Error};
//!
//! struct MyEncryptor;
//!
//! impl Encryptor for MyEncryptor {
//!     async fn encrypt(&self, value: U256, _: Address, _: Address) -> Result<EncryptedInput, X402Error> {
//!         Ok(EncryptedInput { handle: B256::from(value), input_proof: Bytes::new() })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let signer: PrivateKeySigner = "0xYOUR_KEY".parse().unwrap();
//! let client = X402Client::new(FheSchemeClient::new(signer, MyEncryptor));
//!
//! let (resp, receipt) = client
//!     .fetch("https://api.example.com/weather", reqwest::Method::GET)
//!     .await
//!     .unwrap();
//! # }
//! ```

// Core types and traits
pub mod codec;
pub mod constants;
pub mod error;
pub mod hmac;
pub mod networks;
pub mod payment;
pub mod reason;
pub mod response;
pub mod scheme;
pub mod security;

// FHE scheme implementation
pub mod eip712;
pub mod fhe;
pub mod ledger;
pub mod scheme_client;
pub mod scheme_facilitator;
pub mod scheme_server;

// HTTP clients
pub mod facilitator_client;
pub mod http_client;

use alloy::sol;

// EIP-712 struct signed by the payer. The input proof is part of the signed
// message so a relayer cannot swap it for another one.
sol! {
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        bytes32 encryptedValueHandle;
        bytes inputProof;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

// Confidential token interface used for replay checks and settlement.
sol! {
    #[sol(rpc)]
    interface IConfidentialToken {
        event ConfidentialTransfer(address indexed from, address indexed to, bytes32 amount);

        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);

        function transferWithAuthorization(
            address from,
            address to,
            bytes32 encryptedValueHandle,
            bytes inputProof,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external returns (bool);
    }
}

// Re-exports
pub use constants::ChainConfig;
pub use constants::*;
pub use error::X402Error;
pub use payment::*;
pub use reason::ErrorReason;
pub use response::*;
pub use scheme::*;

pub use codec::{decode_payment, decode_settlement, encode_payment, encode_settlement};
pub use facilitator_client::FacilitatorClient;
pub use scheme_client::FheSchemeClient;
pub use scheme_facilitator::FheSchemeFacilitator;
pub use scheme_server::FheSchemeServer;

pub use http_client::X402Client;

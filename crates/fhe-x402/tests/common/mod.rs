#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use x402::eip712::{payment_domain, signing_hash};
use x402::fhe::{DecryptionContext, Decryptor, DecryptorConnector};
use x402::ledger::{Ledger, LedgerError, TransferCall, TransferReceipt};
use x402::{
    Authorization, ChainConfig, FhePaymentData, FheSchemeFacilitator, PaymentPayload,
    PaymentRequirements, TokenDomain, X402Error, DEFAULT_TOKEN, SCHEME_NAME, SEPOLIA_NETWORK,
};

pub const NOW: u64 = 1_750_000_000;
pub const REQUIRED: u64 = 10_000;

/// Handle the mock contract emits in its transfer event.
pub const TRANSFERRED_HANDLE: B256 = B256::repeat_byte(0x77);

type TransferFn = dyn Fn(&TransferCall) -> Result<TransferReceipt, LedgerError> + Send + Sync;
type ReceiptFn = dyn Fn(usize) -> Result<Option<TransferReceipt>, LedgerError> + Send + Sync;

/// In-memory confidential token: tracks consumed nonces like the real contract.
pub struct MockLedger {
    used: Mutex<HashSet<(Address, B256)>>,
    nonce_query_fails: bool,
    on_transfer: Box<TransferFn>,
    on_receipt: Box<ReceiptFn>,
    pub nonce_queries: AtomicUsize,
    pub submissions: AtomicUsize,
    pub receipt_polls: AtomicUsize,
}

impl MockLedger {
    /// A ledger whose transfers succeed and emit [`TRANSFERRED_HANDLE`].
    pub fn new() -> Self {
        Self::with_transfer(|_| {
            Ok(TransferReceipt {
                transaction: B256::repeat_byte(0xaa),
                transferred: Some(TRANSFERRED_HANDLE),
            })
        })
    }

    pub fn with_transfer(
        f: impl Fn(&TransferCall) -> Result<TransferReceipt, LedgerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            used: Mutex::new(HashSet::new()),
            nonce_query_fails: false,
            on_transfer: Box::new(f),
            on_receipt: Box::new(|_| Ok(None)),
            nonce_queries: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            receipt_polls: AtomicUsize::new(0),
        }
    }

    /// A ledger whose transfers are sent but not confirmed in time. Receipt
    /// lookups are answered by `f`, called with the 1-based poll count.
    pub fn pending(
        f: impl Fn(usize) -> Result<Option<TransferReceipt>, LedgerError> + Send + Sync + 'static,
    ) -> Self {
        let mut ledger = Self::with_transfer(|_| {
            Err(LedgerError::Pending {
                transaction: B256::repeat_byte(0xaa),
                message: "no receipt after 60s".to_string(),
            })
        });
        ledger.on_receipt = Box::new(f);
        ledger
    }

    pub fn failing_nonce_queries(mut self) -> Self {
        self.nonce_query_fails = true;
        self
    }

    pub fn mark_used(&self, authorizer: Address, nonce: B256) {
        self.used.lock().unwrap().insert((authorizer, nonce));
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }
}

impl Ledger for MockLedger {
    async fn is_nonce_used(
        &self,
        _asset: Address,
        authorizer: Address,
        nonce: B256,
    ) -> Result<bool, X402Error> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        if self.nonce_query_fails {
            return Err(X402Error::ChainError("rpc unavailable".to_string()));
        }
        Ok(self.used.lock().unwrap().contains(&(authorizer, nonce)))
    }

    async fn transfer_with_authorization(
        &self,
        _asset: Address,
        call: &TransferCall,
    ) -> Result<TransferReceipt, LedgerError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if !self.used.lock().unwrap().insert((call.from, call.nonce)) {
            return Err(LedgerError::Rejected {
                transaction: None,
                message: "execution reverted: authorization is used or canceled".to_string(),
            });
        }
        (self.on_transfer)(call)
    }

    async fn transfer_receipt(
        &self,
        _asset: Address,
        _transaction: B256,
    ) -> Result<Option<TransferReceipt>, LedgerError> {
        let poll = self.receipt_polls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.on_receipt)(poll)
    }

    async fn block_number(&self) -> Result<u64, X402Error> {
        Ok(42)
    }
}

/// Decryption service returning fixed plaintexts per handle.
#[derive(Clone, Default)]
pub struct MockConnector {
    values: Arc<HashMap<B256, U256>>,
    fail_connect: bool,
    fail_decrypt: bool,
    pub connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn revealing(amount: u64) -> Self {
        let mut values = HashMap::new();
        values.insert(TRANSFERRED_HANDLE, U256::from(amount));
        Self {
            values: Arc::new(values),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn failing_decrypt() -> Self {
        Self {
            fail_decrypt: true,
            ..Self::default()
        }
    }
}

pub struct MockDecryptor {
    values: Arc<HashMap<B256, U256>>,
    fail: bool,
}

impl DecryptorConnector for MockConnector {
    type Decryptor = MockDecryptor;

    async fn connect(&self, _network: &str, _endpoint: &str) -> Result<MockDecryptor, X402Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(X402Error::HttpError("relayer unreachable".to_string()));
        }
        Ok(MockDecryptor {
            values: Arc::clone(&self.values),
            fail: self.fail_decrypt,
        })
    }
}

impl Decryptor for MockDecryptor {
    async fn decrypt(&self, handle: B256, _context: &DecryptionContext) -> Result<U256, X402Error> {
        if self.fail {
            return Err(X402Error::DecryptionError("ACL denied".to_string()));
        }
        self.values
            .get(&handle)
            .copied()
            .ok_or_else(|| X402Error::DecryptionError("unknown handle".to_string()))
    }
}

pub fn pay_to() -> Address {
    Address::repeat_byte(0x22)
}

pub fn requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: SCHEME_NAME.to_string(),
        network: SEPOLIA_NETWORK.to_string(),
        max_amount_required: U256::from(REQUIRED),
        resource: "http://localhost:4021/weather".to_string(),
        description: Some("Weather data".to_string()),
        mime_type: Some("application/json".to_string()),
        pay_to: pay_to(),
        max_timeout_seconds: 300,
        asset: DEFAULT_TOKEN,
        extra: Some(TokenDomain {
            name: "ConfidentialUSDC".to_string(),
            version: "1".to_string(),
        }),
    }
}

/// Sign an authorization for `requirements` valid over `[valid_after, valid_before]`.
pub fn signed_payment(
    signer: &PrivateKeySigner,
    requirements: &PaymentRequirements,
    valid_after: u64,
    valid_before: u64,
    nonce: B256,
) -> PaymentPayload {
    let authorization = Authorization {
        from: signer.address(),
        to: requirements.pay_to,
        encrypted_value_handle: B256::repeat_byte(0x33),
        input_proof: Bytes::from(vec![0x0f; 32]),
        valid_after: U256::from(valid_after),
        valid_before: U256::from(valid_before),
        nonce,
    };
    resign(signer, requirements, authorization)
}

/// Sign an arbitrary authorization, e.g. one with a tampered field.
pub fn resign(
    signer: &PrivateKeySigner,
    requirements: &PaymentRequirements,
    authorization: Authorization,
) -> PaymentPayload {
    let domain = payment_domain(requirements, &ChainConfig::default()).unwrap();
    let sig = signer
        .sign_hash_sync(&signing_hash(&authorization, &domain))
        .unwrap();
    PaymentPayload {
        x402_version: 1,
        scheme: requirements.scheme.clone(),
        network: requirements.network.clone(),
        payload: FhePaymentData {
            signature: Bytes::from(sig.as_bytes().to_vec()),
            authorization,
        },
    }
}

/// A payment valid around the real clock, for settlement tests.
pub fn live_payment(signer: &PrivateKeySigner, nonce: B256) -> PaymentPayload {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    signed_payment(signer, &requirements(), now - 60, now + 300, nonce)
}

pub fn facilitator(
    ledger: MockLedger,
    connector: MockConnector,
) -> FheSchemeFacilitator<MockLedger, MockConnector> {
    FheSchemeFacilitator::new(ledger, connector)
}

//! FHE collaborators: encryption on the client, decryption on the facilitator.
//!
//! The facilitator never sees plaintext amounts until settlement, when it asks
//! a [`Decryptor`] to reveal the amount the token contract actually moved.
//! Decryption clients are expensive to set up, so they are pooled in a
//! [`FheClientCache`] keyed by `(network, endpoint)`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::payment::parse_decimal;
use crate::X402Error;

/// Relayer key-info round trip when a decryption client is first built.
pub const RELAYER_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single relayer decryption request.
pub const RELAYER_DECRYPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Who is asking to decrypt, and for which contract's ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionContext {
    pub network: String,
    pub contract: Address,
    pub user: Address,
}

/// Reveals the plaintext behind an encrypted handle.
pub trait Decryptor: Send + Sync {
    fn decrypt(
        &self,
        handle: B256,
        context: &DecryptionContext,
    ) -> impl Future<Output = Result<U256, X402Error>> + Send;
}

/// Builds a [`Decryptor`] for a given network and service endpoint.
pub trait DecryptorConnector: Send + Sync {
    type Decryptor: Decryptor + 'static;

    fn connect(
        &self,
        network: &str,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Decryptor, X402Error>> + Send;
}

/// Ciphertext handle plus the proof binding it to `(contract, user)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handle: B256,
    pub input_proof: Bytes,
}

/// Client-side encryption of a plaintext amount.
pub trait Encryptor: Send + Sync {
    fn encrypt(
        &self,
        value: U256,
        contract: Address,
        user: Address,
    ) -> impl Future<Output = Result<EncryptedInput, X402Error>> + Send;
}

/// Shared pool of decryption clients.
///
/// Concurrent first users of a key wait on one initialisation instead of each
/// building their own client. A failed initialisation is not stored, so the
/// next caller retries.
pub struct FheClientCache<D> {
    clients: DashMap<(String, String), Arc<OnceCell<Arc<D>>>>,
}

impl<D> FheClientCache<D> {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the client for `(network, endpoint)`, creating it with `init` if absent.
    pub async fn get_or_init<F, Fut>(
        &self,
        network: &str,
        endpoint: &str,
        init: F,
    ) -> Result<Arc<D>, X402Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<D, X402Error>>,
    {
        // Clone the cell out so the map shard lock is not held across the await.
        let cell = self
            .clients
            .entry((network.to_string(), endpoint.to_string()))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| async { init().await.map(Arc::new) })
            .await
            .cloned()
    }
}

impl<D> Default for FheClientCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Connects to an FHE relayer over HTTP.
#[derive(Clone)]
pub struct RelayerConnector {
    http: reqwest::Client,
}

impl RelayerConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for RelayerConnector {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[derive(Deserialize)]
struct RelayerKeyInfo {
    #[serde(rename = "chainId")]
    chain_id: u64,
}

impl DecryptorConnector for RelayerConnector {
    type Decryptor = RelayerDecryptor;

    async fn connect(&self, network: &str, endpoint: &str) -> Result<RelayerDecryptor, X402Error> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let expected_chain = crate::networks::chain_id(network)?;

        // The key-info round trip is the expensive part the cache amortises.
        let info: RelayerKeyInfo = self
            .http
            .get(format!("{endpoint}/v1/keyurl"))
            .timeout(RELAYER_CONNECT_TIMEOUT)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("relayer unreachable: {e}")))?
            .json()
            .await
            .map_err(|e| X402Error::HttpError(format!("relayer key info parse failed: {e}")))?;

        if info.chain_id != expected_chain {
            return Err(X402Error::ConfigError(format!(
                "relayer serves chain {} but network '{network}' is chain {expected_chain}",
                info.chain_id
            )));
        }

        tracing::info!(endpoint = %endpoint, network = %network, "FHE relayer client initialised");

        Ok(RelayerDecryptor {
            http: self.http.clone(),
            endpoint,
        })
    }
}

/// Decryptor calling the relayer's decryption endpoint.
pub struct RelayerDecryptor {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest<'a> {
    handle: B256,
    contract_address: Address,
    user_address: Address,
    network: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
    value: String,
}

impl Decryptor for RelayerDecryptor {
    async fn decrypt(&self, handle: B256, context: &DecryptionContext) -> Result<U256, X402Error> {
        let body = DecryptRequest {
            handle,
            contract_address: context.contract,
            user_address: context.user,
            network: &context.network,
        };

        let resp = self
            .http
            .post(format!("{}/v1/decrypt", self.endpoint))
            .json(&body)
            .timeout(RELAYER_DECRYPT_TIMEOUT)
            .send()
            .await
            .map_err(|e| X402Error::DecryptionError(format!("relayer request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(X402Error::DecryptionError(format!(
                "relayer returned {}",
                resp.status()
            )));
        }

        let parsed: DecryptResponse = resp
            .json()
            .await
            .map_err(|e| X402Error::DecryptionError(format!("relayer response parse failed: {e}")))?;

        parse_decimal(&parsed.value).map_err(X402Error::DecryptionError)
    }
}

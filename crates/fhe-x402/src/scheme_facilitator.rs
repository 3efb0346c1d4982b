use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};

use crate::eip712::{payment_domain, verify_signature};
use crate::fhe::{
    DecryptionContext, Decryptor, DecryptorConnector, FheClientCache, RELAYER_CONNECT_TIMEOUT,
    RELAYER_DECRYPT_TIMEOUT,
};
use crate::ledger::{
    Ledger, LedgerError, TransferCall, TransferReceipt, READ_TIMEOUT, RECEIPT_TIMEOUT,
    SEND_TIMEOUT,
};
use crate::networks::same_network;
use crate::{
    ChainConfig, ErrorReason, PaymentPayload, PaymentRequirements, SchemeFacilitator,
    SettleResponse, SupportedKind, VerifyResponse, X402Error, SAFETY_MARGIN_SECS, X402_VERSION,
};

/// How long a pending transfer is polled for its receipt before giving up.
pub const CONFIRMATION_WINDOW: Duration = Duration::from_secs(60);

/// Pause between receipt polls.
pub const CONFIRMATION_INTERVAL: Duration = Duration::from_secs(3);

/// Longest a single `settle` can take with the default bounds: the replay
/// read, send, receipt wait, confirmation polling (whose last poll may start
/// just before the window closes), relayer setup and decryption.
pub const SETTLE_WORST_CASE: Duration = Duration::from_secs(
    READ_TIMEOUT.as_secs()
        + SEND_TIMEOUT.as_secs()
        + RECEIPT_TIMEOUT.as_secs()
        + CONFIRMATION_WINDOW.as_secs()
        + READ_TIMEOUT.as_secs()
        + RELAYER_CONNECT_TIMEOUT.as_secs()
        + RELAYER_DECRYPT_TIMEOUT.as_secs(),
);

/// Facilitator-side scheme implementation: verifies EIP-712 authorizations
/// and settles them through the confidential token's `transferWithAuthorization`.
pub struct FheSchemeFacilitator<L, C: DecryptorConnector> {
    ledger: L,
    connector: C,
    /// Decryption clients shared across requests, keyed by (network, endpoint).
    decryptors: Arc<FheClientCache<C::Decryptor>>,
    config: ChainConfig,
    confirmation_window: Duration,
    confirmation_interval: Duration,
}

impl<L, C: DecryptorConnector> FheSchemeFacilitator<L, C> {
    /// Create a new facilitator with Sepolia defaults and its own client cache.
    pub fn new(ledger: L, connector: C) -> Self {
        Self {
            ledger,
            connector,
            decryptors: Arc::new(FheClientCache::new()),
            config: ChainConfig::default(),
            confirmation_window: CONFIRMATION_WINDOW,
            confirmation_interval: CONFIRMATION_INTERVAL,
        }
    }

    /// Use a custom chain configuration.
    pub fn with_chain_config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a decryption client cache owned by the caller.
    pub fn with_client_cache(mut self, cache: Arc<FheClientCache<C::Decryptor>>) -> Self {
        self.decryptors = cache;
        self
    }

    /// How long, and how often, to poll a pending transfer for its receipt.
    pub fn with_confirmation_window(mut self, window: Duration, interval: Duration) -> Self {
        self.confirmation_window = window;
        self.confirmation_interval = interval;
        self
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn client_cache(&self) -> &Arc<FheClientCache<C::Decryptor>> {
        &self.decryptors
    }
}

fn unix_now() -> Result<u64, X402Error> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| X402Error::ConfigError(format!("system time error: {e}")))?
        .as_secs())
}

impl<L, C> FheSchemeFacilitator<L, C>
where
    L: Ledger,
    C: DecryptorConnector,
{
    /// Verify against an explicit clock. Given the same inputs and an unchanged
    /// ledger, the result is always the same.
    pub async fn verify_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> VerifyResponse {
        let auth = &payload.payload.authorization;
        let payer = auth.from;

        // 1. Scheme
        if payload.scheme != self.config.scheme_name
            || requirements.scheme != self.config.scheme_name
        {
            tracing::debug!(scheme = %payload.scheme, payer = %payer, "unsupported scheme");
            return VerifyResponse::invalid(ErrorReason::UnsupportedScheme, payer);
        }

        // 2. Network
        if !same_network(&payload.network, &requirements.network)
            || !same_network(&requirements.network, &self.config.network)
        {
            tracing::debug!(network = %payload.network, payer = %payer, "network mismatch");
            return VerifyResponse::invalid(ErrorReason::InvalidNetwork, payer);
        }

        // 3. Time window
        let now = U256::from(now);
        if auth.valid_after > now {
            return VerifyResponse::invalid(ErrorReason::AuthorizationNotYetValid, payer);
        }
        if auth.valid_before < now + U256::from(SAFETY_MARGIN_SECS) {
            return VerifyResponse::invalid(ErrorReason::AuthorizationExpired, payer);
        }

        // 4. Replay. Advisory only: the contract re-checks atomically at settlement.
        match self
            .ledger
            .is_nonce_used(requirements.asset, payer, auth.nonce)
            .await
        {
            Ok(true) => {
                tracing::warn!(
                    nonce = %format!("{:.8}", auth.nonce),
                    payer = %payer,
                    "replayed nonce rejected"
                );
                return VerifyResponse::invalid(ErrorReason::NonceAlreadyUsed, payer);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    nonce = %format!("{:.8}", auth.nonce),
                    payer = %payer,
                    error = %e,
                    "nonce state query failed, continuing"
                );
            }
        }

        // 5. EIP-712 signature
        let domain = match payment_domain(requirements, &self.config) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, payer = %payer, "cannot build signing domain");
                return VerifyResponse::invalid(ErrorReason::InvalidSignature, payer);
            }
        };
        if !verify_signature(auth, &payload.payload.signature, &domain, payer) {
            return VerifyResponse::invalid(ErrorReason::InvalidSignature, payer);
        }

        // 6. Recipient
        if auth.to != requirements.pay_to {
            return VerifyResponse::invalid(ErrorReason::RecipientMismatch, payer);
        }

        tracing::info!(
            payer = %payer,
            nonce = %format!("{:.8}", auth.nonce),
            "payment verification succeeded"
        );

        VerifyResponse::valid(payer)
    }

    /// Poll a sent-but-unconfirmed transfer until it is mined or the window
    /// closes. `Ok(None)` means it is still pending.
    async fn await_confirmation(
        &self,
        asset: Address,
        transaction: B256,
    ) -> Result<Option<TransferReceipt>, LedgerError> {
        let deadline = tokio::time::Instant::now() + self.confirmation_window;
        loop {
            match self.ledger.transfer_receipt(asset, transaction).await {
                Ok(Some(receipt)) => return Ok(Some(receipt)),
                Ok(None) => {}
                Err(e @ LedgerError::Reverted { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(tx = %transaction, error = %e, "receipt lookup failed, retrying");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.confirmation_interval).await;
        }
    }

    async fn decrypt_transferred(
        &self,
        handle: B256,
        requirements: &PaymentRequirements,
    ) -> Result<U256, X402Error> {
        let network = requirements.network.as_str();
        let endpoint = self.config.relayer_url.as_str();
        let decryptor = self
            .decryptors
            .get_or_init(network, endpoint, || self.connector.connect(network, endpoint))
            .await?;

        let context = DecryptionContext {
            network: network.to_string(),
            contract: requirements.asset,
            user: requirements.pay_to,
        };
        decryptor.decrypt(handle, &context).await
    }
}

/// Map a hard ledger failure onto the rejection taxonomy.
pub fn classify_ledger_failure(err: &LedgerError) -> ErrorReason {
    match err {
        LedgerError::Reverted { .. } => ErrorReason::TransactionReverted,
        LedgerError::Transport(_) | LedgerError::Pending { .. } => ErrorReason::UnknownError,
        LedgerError::Rejected { message, .. } => {
            let message = message.to_lowercase();
            if message.contains("insufficient") || message.contains("balance") {
                ErrorReason::InsufficientBalance
            } else if message.contains("nonce") || message.contains("authorization is used") {
                ErrorReason::NonceAlreadyUsed
            } else if message.contains("signature") {
                ErrorReason::InvalidSignature
            } else {
                ErrorReason::UnknownError
            }
        }
    }
}

/// Interpret a decrypted transfer amount. `None` means the payment is complete.
pub fn classify_transfer(transferred: U256, required: U256) -> Option<ErrorReason> {
    if transferred.is_zero() {
        Some(ErrorReason::InsufficientBalance)
    } else if transferred < required {
        Some(ErrorReason::PartialTransfer)
    } else {
        None
    }
}

impl<L, C> SchemeFacilitator for FheSchemeFacilitator<L, C>
where
    L: Ledger,
    C: DecryptorConnector,
{
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        let now = unix_now()?;
        Ok(self.verify_at(payload, requirements, now).await)
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        let auth = &payload.payload.authorization;
        let payer = auth.from;
        let network = requirements.network.clone();

        let check = self.verify(payload, requirements).await?;
        if !check.is_valid {
            let reason = check.invalid_reason.unwrap_or(ErrorReason::UnknownError);
            tracing::warn!(payer = %payer, reason = %reason, "settlement rejected after re-verification");
            return Ok(SettleResponse::failed(reason, payer, None, network));
        }

        let call = TransferCall {
            from: auth.from,
            to: auth.to,
            encrypted_value_handle: auth.encrypted_value_handle,
            input_proof: auth.input_proof.clone(),
            valid_after: auth.valid_after,
            valid_before: auth.valid_before,
            nonce: auth.nonce,
            signature: payload.payload.signature.clone(),
        };

        let submitted = match self
            .ledger
            .transfer_with_authorization(requirements.asset, &call)
            .await
        {
            Err(LedgerError::Pending {
                transaction,
                message,
            }) => {
                tracing::warn!(
                    payer = %payer,
                    tx = %transaction,
                    reason = %message,
                    "transfer sent but unconfirmed, polling for receipt"
                );
                match self.await_confirmation(requirements.asset, transaction).await {
                    Ok(Some(receipt)) => Ok(receipt),
                    Ok(None) => {
                        tracing::error!(
                            payer = %payer,
                            nonce = %format!("{:.8}", auth.nonce),
                            tx = %transaction,
                            "transfer still pending after confirmation window"
                        );
                        return Ok(SettleResponse::failed(
                            ErrorReason::UnknownError,
                            payer,
                            Some(transaction.to_string()),
                            network,
                        ));
                    }
                    Err(e) => Err(e),
                }
            }
            other => other,
        };

        let receipt = match submitted {
            Ok(r) => r,
            Err(e) => {
                let reason = classify_ledger_failure(&e);
                tracing::error!(
                    payer = %payer,
                    nonce = %format!("{:.8}", auth.nonce),
                    reason = %reason,
                    error = %e,
                    "transferWithAuthorization failed"
                );
                let tx = e.transaction().map(|h| h.to_string());
                return Ok(SettleResponse::failed(reason, payer, tx, network));
            }
        };

        let tx = receipt.transaction.to_string();

        let Some(handle) = receipt.transferred else {
            tracing::warn!(
                payer = %payer,
                tx = %tx,
                "no transfer event in receipt, amount unverifiable"
            );
            return Ok(SettleResponse::settled(payer, tx, network, None));
        };

        let transferred = match self.decrypt_transferred(handle, requirements).await {
            Ok(amount) => amount,
            Err(e) => {
                // The transfer already happened on-chain; not observing its
                // size does not make it a failed settlement.
                tracing::warn!(
                    payer = %payer,
                    tx = %tx,
                    error = %e,
                    "could not decrypt transferred amount"
                );
                return Ok(SettleResponse::settled(payer, tx, network, None));
            }
        };

        match classify_transfer(transferred, requirements.max_amount_required) {
            None => {
                tracing::info!(
                    payer = %payer,
                    amount = %transferred,
                    nonce = %format!("{:.8}", auth.nonce),
                    tx = %tx,
                    "payment settled successfully"
                );
                Ok(SettleResponse::settled(payer, tx, network, Some(transferred)))
            }
            Some(reason) => {
                tracing::warn!(
                    payer = %payer,
                    amount = %transferred,
                    required = %requirements.max_amount_required,
                    reason = %reason,
                    tx = %tx,
                    "settlement moved less than required"
                );
                let mut resp = SettleResponse::failed(reason, payer, Some(tx), network);
                if reason == ErrorReason::PartialTransfer {
                    resp.transferred_amount = Some(transferred);
                }
                Ok(resp)
            }
        }
    }

    fn supported(&self) -> Vec<SupportedKind> {
        vec![SupportedKind {
            x402_version: X402_VERSION,
            scheme: self.config.scheme_name.clone(),
            network: self.config.network.clone(),
        }]
    }

    async fn health_check(&self) -> Result<u64, X402Error> {
        self.ledger.block_number().await
    }
}

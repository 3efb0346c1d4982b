//! Ledger collaborator: the confidential token contract that records nonces
//! and moves encrypted value.
//!
//! [`Ledger`] is the seam the facilitator depends on; [`ConfidentialTokenLedger`]
//! implements it over any alloy [`Provider`].

use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionReceipt;
use thiserror::Error;

use crate::IConfidentialToken;
use crate::X402Error;

/// Bound on single reads: nonce state and receipt lookups.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on getting `transferWithAuthorization` accepted by the node.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the receipt before reporting the transfer as pending.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Arguments of a `transferWithAuthorization` call, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCall {
    pub from: Address,
    pub to: Address,
    pub encrypted_value_handle: B256,
    pub input_proof: Bytes,
    pub valid_after: U256,
    pub valid_before: U256,
    pub nonce: B256,
    pub signature: Bytes,
}

/// Outcome of a mined, successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transaction: B256,
    /// Encrypted handle of the amount the contract actually moved, taken from
    /// the `ConfidentialTransfer` event. `None` if the event was not emitted.
    pub transferred: Option<B256>,
}

/// Settlement submissions that did not produce a successful receipt.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The node or contract refused the call (e.g. revert during estimation).
    #[error("transfer rejected: {message}")]
    Rejected {
        transaction: Option<B256>,
        message: String,
    },

    /// The transaction was mined but reverted.
    #[error("transaction {transaction} reverted")]
    Reverted { transaction: B256 },

    /// The transaction was sent but its outcome is not known yet. It may
    /// still be mined; look it up with [`Ledger::transfer_receipt`].
    #[error("transaction {transaction} pending: {message}")]
    Pending { transaction: B256, message: String },

    /// The ledger could not be reached before anything was sent.
    #[error("ledger transport error: {0}")]
    Transport(String),
}

impl LedgerError {
    /// Hash of the submitted transaction, if one was produced.
    pub fn transaction(&self) -> Option<B256> {
        match self {
            LedgerError::Rejected { transaction, .. } => *transaction,
            LedgerError::Reverted { transaction } | LedgerError::Pending { transaction, .. } => {
                Some(*transaction)
            }
            LedgerError::Transport(_) => None,
        }
    }
}

/// Read and write access to the confidential token ledger.
pub trait Ledger: Send + Sync {
    /// Whether `(authorizer, nonce)` has already been consumed on `asset`.
    fn is_nonce_used(
        &self,
        asset: Address,
        authorizer: Address,
        nonce: B256,
    ) -> impl Future<Output = Result<bool, X402Error>> + Send;

    /// Submit `transferWithAuthorization` on `asset` and wait for the receipt.
    fn transfer_with_authorization(
        &self,
        asset: Address,
        call: &TransferCall,
    ) -> impl Future<Output = Result<TransferReceipt, LedgerError>> + Send;

    /// Outcome of a transfer that was reported [`LedgerError::Pending`].
    /// `Ok(None)` while it is not mined yet.
    fn transfer_receipt(
        &self,
        asset: Address,
        transaction: B256,
    ) -> impl Future<Output = Result<Option<TransferReceipt>, LedgerError>> + Send;

    /// Latest block number, for health checks.
    fn block_number(&self) -> impl Future<Output = Result<u64, X402Error>> + Send;
}

/// [`Ledger`] backed by an alloy provider with a funded facilitator wallet.
pub struct ConfidentialTokenLedger<P> {
    provider: P,
    read_timeout: Duration,
    send_timeout: Duration,
    receipt_timeout: Duration,
}

impl<P> ConfidentialTokenLedger<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            read_timeout: READ_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            receipt_timeout: RECEIPT_TIMEOUT,
        }
    }

    /// Override the send and receipt bounds. Remote callers of the facilitator
    /// must then allow for the longer worst case.
    pub fn with_timeouts(mut self, send: Duration, receipt: Duration) -> Self {
        self.send_timeout = send;
        self.receipt_timeout = receipt;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> Ledger for ConfidentialTokenLedger<P>
where
    P: Provider + Send + Sync,
{
    async fn is_nonce_used(
        &self,
        asset: Address,
        authorizer: Address,
        nonce: B256,
    ) -> Result<bool, X402Error> {
        let contract = IConfidentialToken::new(asset, &self.provider);
        tokio::time::timeout(
            self.read_timeout,
            contract.authorizationState(authorizer, nonce).call(),
        )
        .await
        .map_err(|_| {
            X402Error::ChainError(format!(
                "authorizationState timed out after {}s",
                self.read_timeout.as_secs()
            ))
        })?
        .map_err(|e| X402Error::ChainError(format!("authorizationState failed: {e}")))
    }

    async fn transfer_with_authorization(
        &self,
        asset: Address,
        call: &TransferCall,
    ) -> Result<TransferReceipt, LedgerError> {
        let contract = IConfidentialToken::new(asset, &self.provider);
        let pending = tokio::time::timeout(
            self.send_timeout,
            contract
                .transferWithAuthorization(
                    call.from,
                    call.to,
                    call.encrypted_value_handle,
                    call.input_proof.clone(),
                    call.valid_after,
                    call.valid_before,
                    call.nonce,
                    call.signature.clone(),
                )
                .send(),
        )
        .await
        .map_err(|_| {
            LedgerError::Transport(format!(
                "transferWithAuthorization send timed out after {}s",
                self.send_timeout.as_secs()
            ))
        })?
        .map_err(|e| LedgerError::Rejected {
            transaction: None,
            message: e.to_string(),
        })?;

        let tx_hash = *pending.tx_hash();

        // Past this point the transaction is out of our hands. Not seeing a
        // receipt only means we stopped waiting.
        let receipt = tokio::time::timeout(self.receipt_timeout, pending.get_receipt())
            .await
            .map_err(|_| LedgerError::Pending {
                transaction: tx_hash,
                message: format!(
                    "no receipt after {}s",
                    self.receipt_timeout.as_secs()
                ),
            })?
            .map_err(|e| LedgerError::Pending {
                transaction: tx_hash,
                message: e.to_string(),
            })?;

        transfer_outcome(asset, &receipt)
    }

    async fn transfer_receipt(
        &self,
        asset: Address,
        transaction: B256,
    ) -> Result<Option<TransferReceipt>, LedgerError> {
        let receipt = tokio::time::timeout(
            self.read_timeout,
            self.provider.get_transaction_receipt(transaction),
        )
        .await
        .map_err(|_| LedgerError::Transport("receipt lookup timed out".to_string()))?
        .map_err(|e| LedgerError::Transport(format!("receipt lookup failed: {e}")))?;

        receipt
            .map(|receipt| transfer_outcome(asset, &receipt))
            .transpose()
    }

    async fn block_number(&self) -> Result<u64, X402Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| X402Error::ChainError(format!("health check failed: {e}")))
    }
}

/// Read a mined receipt: reverted, or the moved amount's handle from the
/// token's own `ConfidentialTransfer` event.
fn transfer_outcome(
    asset: Address,
    receipt: &TransactionReceipt,
) -> Result<TransferReceipt, LedgerError> {
    if !receipt.status() {
        return Err(LedgerError::Reverted {
            transaction: receipt.transaction_hash,
        });
    }

    let transferred = receipt
        .inner
        .logs()
        .iter()
        .filter(|log| log.address() == asset)
        .find_map(|log| {
            log.log_decode::<IConfidentialToken::ConfidentialTransfer>()
                .ok()
                .map(|decoded| decoded.inner.data.amount)
        });

    Ok(TransferReceipt {
        transaction: receipt.transaction_hash,
        transferred,
    })
}

use alloy::network::EthereumWallet;
use alloy::providers::{
    fillers::{
        BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    Identity, RootProvider,
};
use x402::fhe::RelayerConnector;
use x402::ledger::ConfidentialTokenLedger;
use x402::{ChainConfig, FheSchemeFacilitator};

/// Concrete provider type from `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// The production facilitator: alloy-backed ledger, HTTP relayer for decryption.
pub type Facilitator = FheSchemeFacilitator<ConfidentialTokenLedger<WalletProvider>, RelayerConnector>;

/// Shared application state, generic over the facilitator so tests can run
/// the same routes against an in-memory ledger.
pub struct AppState<F> {
    pub facilitator: F,
    /// HMAC secret authenticating `/verify` and `/settle`. Always required.
    pub hmac_secret: Vec<u8>,
    pub chain_config: ChainConfig,
    /// Separate bearer token for `/metrics`.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve `/metrics` without a token when none is configured.
    pub public_metrics: bool,
}

impl<F> AppState<F> {
    pub fn new(facilitator: F, hmac_secret: Vec<u8>, chain_config: ChainConfig) -> Self {
        Self {
            facilitator,
            hmac_secret,
            chain_config,
            metrics_token: None,
            public_metrics: false,
        }
    }

    pub fn with_metrics_token(mut self, token: Option<Vec<u8>>) -> Self {
        self.metrics_token = token;
        self
    }

    pub fn with_public_metrics(mut self, public: bool) -> Self {
        self.public_metrics = public;
        self
    }
}

use alloy::primitives::Address;

/// x402 protocol version carried in every payload and 402 body.
pub const X402_VERSION: u32 = 1;

/// x402 scheme name for FHE-encrypted transfer authorizations.
pub const SCHEME_NAME: &str = "fhe-transfer";

/// Sepolia chain ID (hosts the FHE coprocessor deployment).
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// CAIP-2 network identifier for Sepolia.
pub const SEPOLIA_NETWORK: &str = "eip155:11155111";

/// Confidential USDC wrapper on Sepolia.
pub const DEFAULT_TOKEN: Address = Address::new([
    0x5f, 0x6a, 0x3c, 0x1d, 0x2e, 0x8b, 0x41, 0x07, 0x9a, 0x0c, 0x6e, 0x15, 0xd3, 0x72, 0x48, 0x9b,
    0x0e, 0xc4, 0x21, 0x5a,
]);

/// The confidential token has 6 decimal places.
pub const TOKEN_DECIMALS: u32 = 6;

/// Default RPC endpoint for Sepolia.
pub const RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";

/// Default FHE relayer endpoint used for decryption.
pub const RELAYER_URL: &str = "https://relayer.testnet.zama.cloud";

/// Authorizations expiring within this many seconds are rejected, so they
/// cannot lapse while settlement is in flight.
pub const SAFETY_MARGIN_SECS: u64 = 6;

/// Request header carrying the encoded payment payload.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the encoded settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Runtime chain configuration. Decouples scheme implementations from
/// compile-time constants, enabling multi-chain support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub network: String,
    pub scheme_name: String,
    pub default_token: Address,
    pub token_decimals: u32,
    pub rpc_url: String,
    pub relayer_url: String,
    pub eip712_domain_name: String,
    pub eip712_domain_version: String,
}

impl Default for ChainConfig {
    /// Defaults to the Sepolia confidential token deployment.
    fn default() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            network: SEPOLIA_NETWORK.to_string(),
            scheme_name: SCHEME_NAME.to_string(),
            default_token: DEFAULT_TOKEN,
            token_decimals: TOKEN_DECIMALS,
            rpc_url: RPC_URL.to_string(),
            relayer_url: RELAYER_URL.to_string(),
            eip712_domain_name: "ConfidentialUSDC".to_string(),
            eip712_domain_version: "1".to_string(),
        }
    }
}

impl ChainConfig {
    /// Build a config for another network, resolving its chain id.
    pub fn for_network(network: &str) -> Result<Self, crate::X402Error> {
        let chain_id = crate::networks::chain_id(network)?;
        Ok(Self {
            chain_id,
            network: network.to_string(),
            ..Self::default()
        })
    }
}

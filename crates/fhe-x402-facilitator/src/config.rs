use alloy::signers::local::PrivateKeySigner;
use x402::{ChainConfig, X402Error};

/// Facilitator settings, read from the environment (after `.env` is loaded).
pub struct FacilitatorConfig {
    pub signer: PrivateKeySigner,
    pub chain: ChainConfig,
    /// HMAC secret shared with resource servers. Required.
    pub hmac_secret: Vec<u8>,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    /// Bearer token for `/metrics`, separate from the HMAC secret.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl FacilitatorConfig {
    pub fn from_env() -> Result<Self, X402Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, X402Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let key = get("FACILITATOR_PRIVATE_KEY").ok_or_else(|| {
            X402Error::ConfigError("FACILITATOR_PRIVATE_KEY is required".to_string())
        })?;
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|e| X402Error::ConfigError(format!("invalid FACILITATOR_PRIVATE_KEY: {e}")))?;

        let mut chain = match get("NETWORK") {
            Some(network) => ChainConfig::for_network(network.trim())?,
            None => ChainConfig::default(),
        };
        if let Some(rpc) = get("RPC_URL") {
            chain.rpc_url = rpc;
        }
        if let Some(relayer) = get("FHE_RELAYER_URL") {
            chain.relayer_url = relayer;
        }

        let hmac_secret = get("FACILITATOR_SHARED_SECRET")
            .ok_or_else(|| {
                X402Error::ConfigError(
                    "FACILITATOR_SHARED_SECRET is required (e.g. `openssl rand -hex 32`)"
                        .to_string(),
                )
            })?
            .into_bytes();

        let port = match get("FACILITATOR_PORT").or_else(|| get("PORT")) {
            Some(p) => p
                .parse()
                .map_err(|e| X402Error::ConfigError(format!("invalid port '{p}': {e}")))?,
            None => 4022,
        };

        let rate_limit_rpm = get("RATE_LIMIT_RPM")
            .and_then(|r| r.parse().ok())
            .unwrap_or(120);

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let public_metrics = get("X402_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            signer,
            chain,
            hmac_secret,
            port,
            rate_limit_rpm,
            allowed_origins,
            metrics_token: get("METRICS_TOKEN").map(String::into_bytes),
            public_metrics,
        })
    }
}

use alloy::primitives::{Address, U256};

use crate::payment::parse_decimal;
use crate::{ChainConfig, PaymentRequirements, SchemeServer, TokenDomain, X402Error};

/// Default `maxTimeoutSeconds` for generated requirements.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 60;

/// Server-side scheme: parses prices and builds payment requirements.
pub struct FheSchemeServer {
    config: ChainConfig,
}

impl FheSchemeServer {
    pub fn new() -> Self {
        Self {
            config: ChainConfig::default(),
        }
    }

    pub fn with_chain_config(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Requirements for `price` payable to `pay_to`, with an empty `resource`.
    ///
    /// The result is a template: bind it to a request with
    /// [`PaymentRequirements::for_resource`].
    pub fn requirements(
        &self,
        price: &str,
        pay_to: Address,
    ) -> Result<PaymentRequirements, X402Error> {
        let (amount, asset) = self.parse_price(price)?;
        Ok(PaymentRequirements {
            scheme: self.config.scheme_name.clone(),
            network: self.config.network.clone(),
            max_amount_required: amount,
            resource: String::new(),
            description: None,
            mime_type: None,
            pay_to,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECS,
            asset,
            extra: Some(TokenDomain {
                name: self.config.eip712_domain_name.clone(),
                version: self.config.eip712_domain_version.clone(),
            }),
        })
    }
}

impl Default for FheSchemeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentRequirements {
    /// Copy of these requirements bound to the exact request URL.
    pub fn for_resource(&self, resource_url: impl Into<String>) -> Self {
        Self {
            resource: resource_url.into(),
            ..self.clone()
        }
    }
}

impl SchemeServer for FheSchemeServer {
    /// `"$0.001"`, `"0.01"` and `"$1"` are human prices scaled by the token's
    /// decimals; a bare digit string like `"1000"` is already in smallest units.
    fn parse_price(&self, price: &str) -> Result<(U256, Address), X402Error> {
        let price = price.trim();
        let human = price.starts_with('$') || price.contains('.');

        if !human {
            let amount = parse_decimal(price)
                .map_err(|e| X402Error::ConfigError(format!("invalid price '{price}': {e}")))?;
            return Ok((amount, self.config.default_token));
        }

        let cleaned = price.trim_start_matches('$');
        let overflow = || X402Error::ConfigError(format!("invalid price '{price}': overflow"));

        let (integer_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned, ""));
        if integer_part.is_empty() && fractional_part.is_empty() {
            return Err(X402Error::ConfigError(format!(
                "invalid price '{price}': no numeric content"
            )));
        }

        let integer = if integer_part.is_empty() {
            U256::ZERO
        } else {
            parse_decimal(integer_part).map_err(|e| {
                X402Error::ConfigError(format!("invalid price '{price}': integer part: {e}"))
            })?
        };

        if !fractional_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(X402Error::ConfigError(format!(
                "invalid price '{price}': fractional part is not numeric"
            )));
        }

        // Digits beyond the token's precision are truncated.
        let decimals = self.config.token_decimals as usize;
        let frac_str = &fractional_part[..fractional_part.len().min(decimals)];
        let fractional = if frac_str.is_empty() {
            U256::ZERO
        } else {
            parse_decimal(frac_str).map_err(|e| {
                X402Error::ConfigError(format!("invalid price '{price}': fractional part: {e}"))
            })?
        };

        let ten = U256::from(10u64);
        let multiplier = ten.pow(U256::from(self.config.token_decimals));
        let scale = ten.pow(U256::from(decimals - frac_str.len()));

        let amount = integer
            .checked_mul(multiplier)
            .and_then(|whole| fractional.checked_mul(scale).map(|f| (whole, f)))
            .and_then(|(whole, f)| whole.checked_add(f))
            .ok_or_else(overflow)?;

        Ok((amount, self.config.default_token))
    }
}

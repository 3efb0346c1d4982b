use std::time::Duration;

use alloy::primitives::Address;
use x402::facilitator_client::DEFAULT_TIMEOUT;
use x402::scheme_facilitator::SETTLE_WORST_CASE;
use x402::{ChainConfig, FheSchemeServer, PaymentRequirements, X402Error};

/// Gateway settings shared by every protected route.
#[derive(Debug, Clone)]
pub struct PaymentGateConfig {
    pub facilitator_url: String,
    /// Per-request timeout for `/verify` and `/settle` calls.
    pub facilitator_timeout: Duration,
    pub hmac_secret: Option<Vec<u8>>,
    pub pay_to: Address,
    pub chain: ChainConfig,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl PaymentGateConfig {
    pub fn from_env() -> Result<Self, X402Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, X402Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| get(key).map(|v| v == "true" || v == "1").unwrap_or(false);

        let hmac_secret = get("FACILITATOR_SHARED_SECRET").map(String::into_bytes);
        if hmac_secret.is_none() {
            if !flag("X402_INSECURE_NO_HMAC") {
                return Err(X402Error::ConfigError(
                    "FACILITATOR_SHARED_SECRET is required \
                     (set X402_INSECURE_NO_HMAC=true for local development only)"
                        .to_string(),
                ));
            }
            tracing::warn!(
                "X402_INSECURE_NO_HMAC=true, facilitator requests will be UNAUTHENTICATED"
            );
        }

        let pay_to = get("PAY_TO")
            .ok_or_else(|| X402Error::ConfigError("PAY_TO is required".to_string()))?
            .trim()
            .parse::<Address>()
            .map_err(|e| X402Error::ConfigError(format!("invalid PAY_TO: {e}")))?;

        let mut chain = match get("NETWORK") {
            Some(network) => ChainConfig::for_network(network.trim())?,
            None => ChainConfig::default(),
        };
        if let Some(asset) = get("ASSET") {
            chain.default_token = asset
                .trim()
                .parse()
                .map_err(|e| X402Error::ConfigError(format!("invalid ASSET: {e}")))?;
        }

        let port = match get("PORT") {
            Some(p) => p
                .parse()
                .map_err(|e| X402Error::ConfigError(format!("invalid PORT '{p}': {e}")))?,
            None => 4021,
        };

        let facilitator_timeout = match get("FACILITATOR_TIMEOUT_SECS") {
            Some(t) => Duration::from_secs(t.trim().parse().map_err(|e| {
                X402Error::ConfigError(format!("invalid FACILITATOR_TIMEOUT_SECS '{t}': {e}"))
            })?),
            None => DEFAULT_TIMEOUT,
        };
        if facilitator_timeout <= SETTLE_WORST_CASE {
            tracing::warn!(
                timeout_secs = facilitator_timeout.as_secs(),
                worst_case_secs = SETTLE_WORST_CASE.as_secs(),
                "facilitator timeout is below its settlement worst case, slow settlements may be dropped"
            );
        }

        Ok(Self {
            facilitator_url: get("FACILITATOR_URL")
                .unwrap_or_else(|| "http://localhost:4022".to_string()),
            facilitator_timeout,
            hmac_secret,
            pay_to,
            chain,
            port,
            rate_limit_rpm: get("RATE_LIMIT_RPM")
                .and_then(|r| r.parse().ok())
                .unwrap_or(60),
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            metrics_token: get("METRICS_TOKEN").map(String::into_bytes),
            public_metrics: flag("X402_PUBLIC_METRICS"),
        })
    }
}

/// A `"METHOD /path"` route pattern. A trailing `*` segment matches any
/// suffix, and method `*` matches every method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    method: Option<String>,
    path: String,
    prefix: bool,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, X402Error> {
        let (method, path) = pattern
            .trim()
            .split_once(' ')
            .ok_or_else(|| {
                X402Error::ConfigError(format!("route '{pattern}' must be \"METHOD /path\""))
            })?;
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(X402Error::ConfigError(format!(
                "route '{pattern}': path must start with '/'"
            )));
        }

        let method = match method.trim() {
            "*" => None,
            m => Some(m.to_ascii_uppercase()),
        };

        let (path, prefix) = match path.strip_suffix('*') {
            Some(rest) if rest.ends_with('/') => (rest.to_string(), true),
            Some(_) => {
                return Err(X402Error::ConfigError(format!(
                    "route '{pattern}': '*' is only allowed as a whole trailing segment"
                )))
            }
            None => (path.to_string(), false),
        };

        Ok(Self {
            method,
            path,
            prefix,
        })
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        if let Some(m) = &self.method {
            if !m.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if self.prefix {
            // "/files/*" also covers "/files" itself.
            path.starts_with(&self.path) || path == self.path.trim_end_matches('/')
        } else {
            path == self.path
        }
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = self.method.as_deref().unwrap_or("*");
        let star = if self.prefix { "*" } else { "" };
        write!(f, "{method} {}{star}", self.path)
    }
}

/// Payment configuration for a single route: its pattern and the
/// requirements template, with `resource` filled in per request.
#[derive(Debug, Clone)]
pub struct RoutePaymentConfig {
    pub pattern: RoutePattern,
    pub requirements: PaymentRequirements,
}

/// Ordered list of protected routes. The first matching pattern wins.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfig {
    pub routes: Vec<RoutePaymentConfig>,
}

impl PaymentConfig {
    /// Look up the payment config for a request.
    pub fn get_route(&self, method: &str, path: &str) -> Option<&RoutePaymentConfig> {
        self.routes.iter().find(|r| r.pattern.matches(method, path))
    }
}

/// Builder for a [`PaymentConfig`]. Prices and patterns are validated at
/// registration, so a misconfigured route fails at startup.
pub struct PaymentConfigBuilder {
    scheme: FheSchemeServer,
    pay_to: Address,
    max_timeout_seconds: u64,
    routes: Vec<RoutePaymentConfig>,
}

impl PaymentConfigBuilder {
    pub fn new(scheme: FheSchemeServer, pay_to: Address) -> Self {
        Self {
            scheme,
            pay_to,
            max_timeout_seconds: x402::scheme_server::DEFAULT_MAX_TIMEOUT_SECS,
            routes: Vec::new(),
        }
    }

    /// Builder for the gateway's chain and recipient.
    pub fn from_gate_config(gate: &PaymentGateConfig) -> Self {
        Self::new(FheSchemeServer::with_chain_config(gate.chain.clone()), gate.pay_to)
    }

    /// `maxTimeoutSeconds` for routes registered after this call.
    pub fn max_timeout_seconds(mut self, secs: u64) -> Self {
        self.max_timeout_seconds = secs;
        self
    }

    /// Register a priced route, e.g. `route("GET /weather", "$0.001", Some("..."))`.
    ///
    /// `price` is a human string like `"$0.001"` or a raw smallest-unit integer.
    pub fn route(
        mut self,
        pattern: &str,
        price: &str,
        description: Option<&str>,
    ) -> Result<Self, X402Error> {
        let pattern = RoutePattern::parse(pattern)?;
        let mut requirements = self.scheme.requirements(price, self.pay_to)?;
        requirements.description = description.map(String::from);
        requirements.mime_type = Some("application/json".to_string());
        requirements.max_timeout_seconds = self.max_timeout_seconds;

        self.routes.push(RoutePaymentConfig {
            pattern,
            requirements,
        });
        Ok(self)
    }

    pub fn build(self) -> PaymentConfig {
        PaymentConfig {
            routes: self.routes,
        }
    }
}

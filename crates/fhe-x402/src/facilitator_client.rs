//! HTTP client for a remote facilitator's `/verify`, `/settle` and `/supported`
//! endpoints.
//!
//! [`FacilitatorClient`] implements [`SchemeFacilitator`], so a resource server
//! can use a remote facilitator wherever an in-process one would fit.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::hmac::{compute_hmac, FACILITATOR_AUTH_HEADER};
use crate::scheme_facilitator::SETTLE_WORST_CASE;
use crate::{
    PaymentPayload, PaymentRequirements, SchemeFacilitator, SettleResponse, SupportedKind,
    SupportedResponse, VerifyResponse, X402Error, SCHEME_NAME, SEPOLIA_NETWORK, X402_VERSION,
};

/// Default per-request timeout. `/settle` must outlive the facilitator's own
/// bounds, or a transfer that is still being confirmed gets reported as failed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(SETTLE_WORST_CASE.as_secs() + 30);

/// Request body of `/verify` and `/settle`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequestRef<'a> {
    payment_payload: &'a PaymentPayload,
    payment_requirements: &'a PaymentRequirements,
}

#[derive(Deserialize)]
struct HealthBody {
    #[serde(rename = "latestBlock")]
    latest_block: Option<String>,
}

pub struct FacilitatorClient {
    http: reqwest::Client,
    base_url: String,
    hmac_secret: Option<Vec<u8>>,
    kinds: Vec<SupportedKind>,
    timeout: Duration,
}

impl FacilitatorClient {
    /// Create a client for the facilitator at `base_url`. Without a secret,
    /// requests are sent unsigned and a hardened facilitator will refuse them.
    pub fn new(base_url: &str, hmac_secret: Option<Vec<u8>>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            hmac_secret,
            kinds: vec![SupportedKind {
                x402_version: X402_VERSION,
                scheme: SCHEME_NAME.to_string(),
                network: SEPOLIA_NETWORK.to_string(),
            }],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Per-request timeout. Keep it above the facilitator's settlement
    /// worst case.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Override the kinds reported by [`SchemeFacilitator::supported`].
    pub fn with_supported(mut self, kinds: Vec<SupportedKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch `/supported` from the facilitator.
    pub async fn fetch_supported(&self) -> Result<SupportedResponse, X402Error> {
        let resp = self
            .http
            .get(format!("{}/supported", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;
        parse_response(resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<T, X402Error> {
        let body = serde_json::to_vec(&FacilitatorRequestRef {
            payment_payload: payload,
            payment_requirements: requirements,
        })?;

        let mut request = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json")
            .timeout(self.timeout);

        if let Some(secret) = &self.hmac_secret {
            request = request.header(FACILITATOR_AUTH_HEADER, compute_hmac(secret, &body));
        }

        let resp = request
            .body(body)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(X402Error::HttpError(
                "facilitator authentication failed".to_string(),
            ));
        }

        parse_response(resp).await
    }
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, X402Error> {
    let status = resp.status();
    if !status.is_success() {
        return Err(X402Error::HttpError(format!("facilitator returned {status}")));
    }
    resp.json::<T>()
        .await
        .map_err(|e| X402Error::HttpError(format!("facilitator response parse failed: {e}")))
}

impl SchemeFacilitator for FacilitatorClient {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        self.post("/verify", payload, requirements).await
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        self.post("/settle", payload, requirements).await
    }

    fn supported(&self) -> Vec<SupportedKind> {
        self.kinds.clone()
    }

    async fn health_check(&self) -> Result<u64, X402Error> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator unreachable: {e}")))?;
        let body: HealthBody = parse_response(resp).await?;
        body.latest_block
            .and_then(|b| b.parse().ok())
            .ok_or_else(|| X402Error::HttpError("facilitator reported no block".to_string()))
    }
}

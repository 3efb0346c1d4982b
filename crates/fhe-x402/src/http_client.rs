use crate::codec::{decode_settlement, encode_payment};
use crate::{
    PaymentRequiredBody, SchemeClient, SettleResponse, X402Error, PAYMENT_HEADER,
    PAYMENT_RESPONSE_HEADER,
};

/// HTTP client that answers 402 challenges automatically.
///
/// On a 402 it picks the first requirement whose scheme the client speaks,
/// builds a payload through the [`SchemeClient`], and retries once with the
/// `X-PAYMENT` header.
pub struct X402Client<S: SchemeClient> {
    http: reqwest::Client,
    scheme: S,
    scheme_name: String,
}

impl<S: SchemeClient> X402Client<S> {
    pub fn new(scheme: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            scheme,
            scheme_name: crate::SCHEME_NAME.to_string(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Make a request, paying if challenged. Returns the final response and
    /// the decoded settlement receipt when one was attached.
    pub async fn fetch(
        &self,
        url: &str,
        method: reqwest::Method,
    ) -> Result<(reqwest::Response, Option<SettleResponse>), X402Error> {
        let resp = self
            .http
            .request(method.clone(), url)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("request failed: {e}")))?;

        if resp.status() != reqwest::StatusCode::PAYMENT_REQUIRED {
            return Ok((resp, None));
        }

        let body: PaymentRequiredBody = resp
            .json()
            .await
            .map_err(|e| X402Error::HttpError(format!("failed to parse 402 body: {e}")))?;

        let requirements = body
            .accepts
            .iter()
            .find(|r| r.scheme == self.scheme_name)
            .ok_or_else(|| {
                X402Error::UnsupportedScheme(format!(
                    "no supported scheme found in {:?}",
                    body.accepts.iter().map(|r| &r.scheme).collect::<Vec<_>>()
                ))
            })?;

        let payload = self
            .scheme
            .create_payment_payload(body.x402_version, requirements)
            .await?;

        tracing::debug!(
            resource = %requirements.resource,
            amount = %requirements.max_amount_required,
            "answering payment challenge"
        );

        let resp = self
            .http
            .request(method, url)
            .header(PAYMENT_HEADER, encode_payment(&payload)?)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("paid request failed: {e}")))?;

        let settle = resp
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| decode_settlement(s).ok());

        Ok((resp, settle))
    }
}

//! Payment gate: challenge, decode, verify, execute, settle, respond.
//!
//! Handlers wrap their resource logic in [`PaymentGate::process`]. The
//! resource future only runs once the payment has been verified, and its
//! output is discarded if settlement fails afterwards.

use std::future::Future;

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse};
use alloy::primitives::Address;
use x402::{
    decode_payment, encode_settlement, ErrorReason, PaymentRequiredBody, PaymentRequirements,
    SchemeFacilitator, SettleResponse, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER, X402_VERSION,
};

use crate::config::PaymentConfig;
use crate::metrics;

/// Build the 402 body for a rejection.
pub fn payment_required_body(
    requirements: &PaymentRequirements,
    reason: ErrorReason,
    payer: Option<Address>,
) -> PaymentRequiredBody {
    PaymentRequiredBody {
        x402_version: X402_VERSION,
        error: reason.to_string(),
        accepts: vec![requirements.clone()],
        payer,
    }
}

/// The absolute URL the client requested, as bound into `resource`.
pub fn resource_url(req: &HttpRequest) -> String {
    let conn = req.connection_info();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| req.path());
    format!("{}://{}{}", conn.scheme(), conn.host(), path)
}

/// Gates requests on configured routes behind x402 payments.
///
/// `F` is the facilitator: a remote [`x402::FacilitatorClient`] in
/// production, or any in-process [`SchemeFacilitator`].
pub struct PaymentGate<F> {
    facilitator: F,
    config: PaymentConfig,
}

impl<F: SchemeFacilitator> PaymentGate<F> {
    pub fn new(facilitator: F, config: PaymentConfig) -> Self {
        Self {
            facilitator,
            config,
        }
    }

    pub fn facilitator(&self) -> &F {
        &self.facilitator
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Requirements for this request, or `None` if its route is not gated.
    pub fn requirements_for(&self, req: &HttpRequest) -> Option<(String, PaymentRequirements)> {
        self.config
            .get_route(req.method().as_str(), req.path())
            .map(|route| {
                (
                    route.pattern.to_string(),
                    route.requirements.for_resource(resource_url(req)),
                )
            })
    }

    /// Run `resource` behind the payment gate.
    ///
    /// Ungated routes run `resource` directly. A resource response with status
    /// >= 400 is returned as-is and nothing is settled.
    pub async fn process<Fut>(&self, req: &HttpRequest, resource: Fut) -> HttpResponse
    where
        Fut: Future<Output = HttpResponse>,
    {
        let Some((endpoint, requirements)) = self.requirements_for(req) else {
            return resource.await;
        };

        let reject = |reason: ErrorReason, payer: Option<Address>| {
            metrics::record_request(&endpoint, 402);
            metrics::record_attempt(reason.as_str());
            HttpResponse::PaymentRequired().json(payment_required_body(&requirements, reason, payer))
        };

        // NoPayment
        let Some(header) = req.headers().get(PAYMENT_HEADER) else {
            metrics::record_request(&endpoint, 402);
            return HttpResponse::PaymentRequired().json(payment_required_body(
                &requirements,
                ErrorReason::PaymentRequired,
                None,
            ));
        };

        // Decoding
        let payload = match header
            .to_str()
            .map_err(|e| x402::X402Error::MalformedPayload(e.to_string()))
            .and_then(decode_payment)
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %endpoint, "undecodable payment header");
                return reject(ErrorReason::MalformedPayload, None);
            }
        };
        let payer = payload.payer();

        tracing::info!(
            payer = %payer,
            nonce = %format!("{:.8}", payload.payload.authorization.nonce),
            endpoint = %endpoint,
            "payment attempt"
        );

        // Verifying
        match self.facilitator.verify(&payload, &requirements).await {
            Ok(v) if v.is_valid => {}
            Ok(v) => {
                let reason = v.invalid_reason.unwrap_or(ErrorReason::UnknownError);
                tracing::warn!(payer = %payer, reason = %reason, "{}", reason.message());
                return reject(reason, Some(payer));
            }
            Err(e) => {
                tracing::error!(error = %e, payer = %payer, "facilitator verify failed");
                return reject(ErrorReason::UnknownError, Some(payer));
            }
        }

        // Executing
        let response = resource.await;
        if response.status().as_u16() >= 400 {
            metrics::record_request(&endpoint, response.status().as_u16());
            tracing::debug!(
                status = response.status().as_u16(),
                "resource failed, payment not settled"
            );
            return response;
        }

        // Settling
        let settlement = match self.facilitator.settle(&payload, &requirements).await {
            Ok(s) if s.success => s,
            Ok(s) => {
                let reason = s.error_reason.unwrap_or(ErrorReason::UnknownError);
                tracing::warn!(
                    payer = %payer,
                    reason = %reason,
                    tx = %s.transaction,
                    "settlement failed, discarding resource output"
                );
                return reject(reason, Some(payer));
            }
            Err(e) => {
                tracing::error!(error = %e, payer = %payer, "facilitator settle failed");
                return reject(ErrorReason::UnknownError, Some(payer));
            }
        };

        // Responding
        metrics::record_attempt("settled");
        metrics::record_request(&endpoint, response.status().as_u16());
        tracing::info!(
            payer = %payer,
            tx = %settlement.transaction,
            amount = ?settlement.transferred_amount,
            "payment settled"
        );
        attach_receipt(response, &settlement)
    }
}

fn attach_receipt(mut response: HttpResponse, settlement: &SettleResponse) -> HttpResponse {
    let header = encode_settlement(settlement)
        .map_err(|e| e.to_string())
        .and_then(|encoded| HeaderValue::from_str(&encoded).map_err(|e| e.to_string()))
        .and_then(|value| {
            HeaderName::from_bytes(PAYMENT_RESPONSE_HEADER.as_bytes())
                .map(|name| (name, value))
                .map_err(|e| e.to_string())
        });
    match header {
        Ok((name, value)) => {
            response.headers_mut().insert(name, value);
        }
        Err(e) => tracing::error!(error = %e, "could not encode settlement receipt"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use alloy::primitives::U256;

    fn requirements() -> PaymentRequirements {
        x402::FheSchemeServer::new()
            .requirements("$0.01", Address::repeat_byte(0x22))
            .unwrap()
    }

    #[test]
    fn test_resource_url_includes_query() {
        let req = TestRequest::get()
            .uri("/weather?city=oslo")
            .insert_header(("Host", "api.example.com"))
            .to_http_request();
        assert_eq!(resource_url(&req), "http://api.example.com/weather?city=oslo");
    }

    #[test]
    fn test_payment_required_body_shape() {
        let body = payment_required_body(
            &requirements(),
            ErrorReason::RecipientMismatch,
            Some(Address::repeat_byte(0x11)),
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["error"], "RecipientMismatch");
        assert_eq!(json["accepts"].as_array().unwrap().len(), 1);
        assert_eq!(json["accepts"][0]["maxAmountRequired"], "10000");
        assert!(json["payer"].is_string());
    }

    #[test]
    fn test_receipt_header_decodes() {
        let settlement = SettleResponse::settled(
            Address::repeat_byte(0x11),
            "0xabc".to_string(),
            "eip155:11155111".to_string(),
            Some(U256::from(10_000u64)),
        );
        let resp = attach_receipt(HttpResponse::Ok().finish(), &settlement);
        let header = resp
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(x402::decode_settlement(header).unwrap(), settlement);
    }
}

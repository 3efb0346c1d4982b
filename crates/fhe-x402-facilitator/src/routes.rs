use actix_web::{web, HttpRequest, HttpResponse};
use x402::facilitator_client::FacilitatorRequest;
use x402::hmac::FACILITATOR_AUTH_HEADER;
use x402::{ErrorReason, SchemeFacilitator, SupportedResponse};

use crate::metrics;
use crate::state::AppState;

/// Register every facilitator endpoint for a facilitator of type `F`.
pub fn configure<F: SchemeFacilitator + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::<F>))
        .route("/metrics", web::get().to(metrics_endpoint::<F>))
        .route("/supported", web::get().to(supported::<F>))
        .route("/verify", web::post().to(verify::<F>))
        .route("/settle", web::post().to(settle::<F>));
}

/// Validate the HMAC header on an incoming request.
/// Returns an error response if the signature is missing or invalid.
fn validate_hmac<F>(
    req: &HttpRequest,
    body_bytes: &[u8],
    state: &AppState<F>,
) -> Result<(), HttpResponse> {
    let header_value = req
        .headers()
        .get(FACILITATOR_AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    match header_value {
        Some(sig) if x402::hmac::verify_hmac(&state.hmac_secret, body_bytes, sig) => Ok(()),
        Some(_) => {
            tracing::warn!(path = %req.path(), "HMAC verification failed, signature mismatch");
            metrics::HMAC_FAILURES.with_label_values(&["invalid"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication failed"
            })))
        }
        None => {
            tracing::warn!(path = %req.path(), "HMAC header missing");
            metrics::HMAC_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

fn parse_request(body: &[u8]) -> Option<FacilitatorRequest> {
    serde_json::from_slice(body)
        .map_err(|e| tracing::debug!(error = %e, "unparseable facilitator request"))
        .ok()
}

pub async fn health<F: SchemeFacilitator + 'static>(
    state: web::Data<AppState<F>>,
) -> HttpResponse {
    match state.facilitator.health_check().await {
        Ok(block) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "x402-facilitator",
            "latestBlock": block.to_string(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "x402-facilitator",
                "error": "RPC unreachable",
            }))
        }
    }
}

pub async fn metrics_endpoint<F: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<F>>,
) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            let authorized = x402::security::bearer_matches(header, token);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

pub async fn supported<F: SchemeFacilitator + 'static>(
    state: web::Data<AppState<F>>,
) -> HttpResponse {
    HttpResponse::Ok().json(SupportedResponse {
        kinds: state.facilitator.supported(),
    })
}

pub async fn verify<F: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<F>>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, &body, &state) {
        return resp;
    }

    let Some(parsed) = parse_request(&body) else {
        metrics::record_verify("invalid");
        return HttpResponse::BadRequest().json(serde_json::json!({
            "isValid": false,
            "invalidReason": ErrorReason::MalformedPayload,
            "error": "invalid request body",
        }));
    };

    match state
        .facilitator
        .verify(&parsed.payment_payload, &parsed.payment_requirements)
        .await
    {
        Ok(result) => {
            if result.is_valid {
                metrics::record_verify("valid");
            } else {
                metrics::record_verify("invalid");
                tracing::warn!(
                    payer = %result.payer,
                    reason = %result.invalid_reason.unwrap_or(ErrorReason::UnknownError),
                    "payment verification rejected"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::record_verify("error");
            tracing::error!(error = %e, "verification internal error");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "isValid": false,
                "invalidReason": ErrorReason::UnknownError,
                "payer": parsed.payment_payload.payer(),
            }))
        }
    }
}

pub async fn settle<F: SchemeFacilitator + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<F>>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, &body, &state) {
        return resp;
    }

    let Some(parsed) = parse_request(&body) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "success": false,
            "errorReason": ErrorReason::MalformedPayload,
            "transaction": "",
            "network": &state.chain_config.network,
        }));
    };

    let start = std::time::Instant::now();

    match state
        .facilitator
        .settle(&parsed.payment_payload, &parsed.payment_requirements)
        .await
    {
        Ok(result) => {
            let elapsed = start.elapsed().as_secs_f64();
            if result.success {
                metrics::record_settle("success", elapsed);
                tracing::info!(
                    payer = %result.payer,
                    tx = %result.transaction,
                    verified_amount = result.transferred_amount.is_some(),
                    "settlement completed"
                );
            } else {
                metrics::record_settle("rejected", elapsed);
                tracing::warn!(
                    payer = %result.payer,
                    reason = %result.error_reason.unwrap_or(ErrorReason::UnknownError),
                    tx = %result.transaction,
                    "settlement rejected"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::record_settle("error", start.elapsed().as_secs_f64());
            tracing::error!(error = %e, "settlement internal error");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "errorReason": ErrorReason::UnknownError,
                "payer": parsed.payment_payload.payer(),
                "transaction": "",
                "network": &state.chain_config.network,
            }))
        }
    }
}

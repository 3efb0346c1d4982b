use actix_web::{web, HttpRequest, HttpResponse};
use x402::{FacilitatorClient, SchemeFacilitator};
use x402_server::PaymentGate;

pub struct ServerState {
    pub gate: PaymentGate<FacilitatorClient>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_endpoint))
        .route("/weather", web::get().to(weather));
}

/// Paid demo resource. The body is only built once the payment has verified.
pub async fn weather(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    let city = req
        .uri()
        .query()
        .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("city=")))
        .unwrap_or("Paris")
        .to_string();

    state
        .gate
        .process(&req, async move {
            HttpResponse::Ok().json(serde_json::json!({
                "city": city,
                "weather": "sunny",
                "temperature": 22,
            }))
        })
        .await
}

pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
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
        .body(x402_server::metrics::metrics_output())
}

/// Healthy when the facilitator can reach its ledger.
pub async fn health(state: web::Data<ServerState>) -> HttpResponse {
    match state.gate.facilitator().health_check().await {
        Ok(block) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "x402-server",
            "latestBlock": block.to_string(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "health check: facilitator unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "x402-server",
            }))
        }
    }
}

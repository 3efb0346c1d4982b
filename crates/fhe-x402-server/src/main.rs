use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;

use x402::FacilitatorClient;
use x402_server::{PaymentConfigBuilder, PaymentGate, PaymentGateConfig};

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        Cors::default().allowed_origin_fn(|origin, _| {
            origin
                .to_str()
                .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                .unwrap_or(false)
        })
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    // Clients must be able to read the receipt header.
    cors.allow_any_method()
        .allow_any_header()
        .expose_headers(vec![x402::PAYMENT_RESPONSE_HEADER])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match PaymentGateConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let payments = match PaymentConfigBuilder::from_gate_config(&config)
        .route("GET /weather", "$0.001", Some("Current weather for a city"))
    {
        Ok(builder) => builder.build(),
        Err(e) => {
            tracing::error!("invalid route configuration: {e}");
            std::process::exit(1);
        }
    };

    let facilitator = FacilitatorClient::new(&config.facilitator_url, config.hmac_secret.clone())
        .with_timeout(config.facilitator_timeout);
    match facilitator.fetch_supported().await {
        Ok(supported) => {
            let served = supported
                .kinds
                .iter()
                .any(|k| k.scheme == config.chain.scheme_name && k.network == config.chain.network);
            if !served {
                tracing::warn!(
                    network = %config.chain.network,
                    "facilitator does not advertise scheme {}",
                    config.chain.scheme_name
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "facilitator /supported unavailable at startup"),
    }

    let state = web::Data::new(routes::ServerState {
        gate: PaymentGate::new(facilitator, payments),
        metrics_token: config.metrics_token.clone(),
        public_metrics: config.public_metrics,
    });

    let port = config.port;
    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!(rpm = config.rate_limit_rpm, "invalid rate limiter config");
            std::process::exit(1);
        }
    };
    let cors_origins = config.allowed_origins.clone();

    tracing::info!("x402 resource server listening at http://localhost:{port}");
    tracing::info!("Facilitator: {}", config.facilitator_url);
    tracing::info!("Paying to {} on {}", config.pay_to, config.chain.network);
    for route in &state.gate.config().routes {
        tracing::info!(
            amount = %route.requirements.max_amount_required,
            "  {} (paid)",
            route.pattern
        );
    }

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

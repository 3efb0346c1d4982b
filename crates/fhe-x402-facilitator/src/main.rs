use std::sync::Arc;

use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use alloy::providers::ProviderBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402::fhe::{FheClientCache, RelayerConnector};
use x402::ledger::ConfidentialTokenLedger;
use x402::FheSchemeFacilitator;
use x402_facilitator::config::FacilitatorConfig;
use x402_facilitator::routes;
use x402_facilitator::state::{AppState, Facilitator};

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        // Default: allow localhost on any port
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
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["content-type", "authorization", "x-facilitator-auth"])
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

    let config = match FacilitatorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    if config.hmac_secret.len() < 32 {
        tracing::warn!(
            "FACILITATOR_SHARED_SECRET is only {} bytes (minimum 32 recommended)",
            config.hmac_secret.len()
        );
    }
    if config.metrics_token.is_none() && config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set and X402_PUBLIC_METRICS enabled, /metrics is public");
    }

    let rpc_url: reqwest::Url = match config.chain.rpc_url.parse() {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(rpc_url = %config.chain.rpc_url, "invalid RPC_URL: {e}");
            std::process::exit(1);
        }
    };

    let facilitator_address = config.signer.address();
    let provider = ProviderBuilder::new()
        .wallet(alloy::network::EthereumWallet::from(config.signer.clone()))
        .connect_http(rpc_url);

    // Owned here and handed to the facilitator, so every request shares the
    // same decryption clients.
    let decryptors = Arc::new(FheClientCache::new());

    let facilitator: Facilitator = FheSchemeFacilitator::new(
        ConfidentialTokenLedger::new(provider),
        RelayerConnector::default(),
    )
    .with_chain_config(config.chain.clone())
    .with_client_cache(decryptors);

    let state = web::Data::new(
        AppState::new(facilitator, config.hmac_secret.clone(), config.chain.clone())
            .with_metrics_token(config.metrics_token.clone())
            .with_public_metrics(config.public_metrics),
    );

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

    tracing::info!("x402 FHE facilitator listening on port {port}");
    tracing::info!("Facilitator address: {facilitator_address}");
    tracing::info!(
        network = %config.chain.network,
        relayer = %config.chain.relayer_url,
        "serving scheme {}",
        config.chain.scheme_name
    );
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/verify");
    tracing::info!("  POST http://localhost:{port}/settle");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .configure(routes::configure::<Facilitator>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

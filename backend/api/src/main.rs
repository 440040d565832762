//! FitStake API — entry point.
//!
//! Hosts the commitment-contract ledger behind a small Axum REST API:
//! contract CRUD, daily check-ins, payment-gateway callbacks, and
//! settlement. State lives in SQLite; expiry is evaluated lazily on
//! read, so no background tasks run.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod gateway;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use gateway::GatewayClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client for the payment gateway; every call is bounded by this
    // timeout rather than waiting indefinitely.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(config.gateway_timeout_secs))
        .build()?;
    let gateway = GatewayClient::new(client, config.gateway_url.clone());

    let state = Arc::new(api::ApiState { pool, gateway });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/contracts", post(api::create_contract))
        .route(
            "/contracts/:id",
            get(api::get_contract).delete(api::delete_contract),
        )
        .route("/contracts/:id/snapshot", get(api::snapshot))
        .route("/contracts/:id/payment/retry", post(api::retry_payment))
        .route("/contracts/:id/checkins", post(api::record_checkin))
        .route("/contracts/:id/days/:date/close", post(api::close_day))
        .route("/contracts/:id/settle", post(api::settle_contract))
        .route("/payments/callback", post(api::payment_callback))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

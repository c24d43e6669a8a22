//! haat-cloud — marketplace backend for farmers and buyers
//!
//! Long-running service that:
//! - Serves the JSON API (orders, negotiations, group sales, haat events)
//! - Takes eSewa payments and verifies their callbacks
//! - Delivers push notifications from the notification outbox
//! - Proxies Kalimati market prices through a short-lived cache

mod api;
mod auth;
mod config;
mod db;
mod error;
mod esewa;
mod geo;
mod group_sale;
mod negotiation;
mod notify;
mod orders;
mod price_feed;
mod state;
mod util;

use std::net::SocketAddr;

use config::Config;
use state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haat_cloud=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting haat-cloud (env: {})", config.environment);

    // Initialize application state
    let state = AppState::new(&config).await?;

    // Periodic rate limiter cleanup (every 5 minutes)
    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rate_limiter.cleanup().await;
        }
    });

    // Push outbox worker
    tokio::spawn(notify::worker::run(state.pool.clone(), state.expo.clone()));

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("haat-cloud HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

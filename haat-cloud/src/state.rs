//! Application state for haat-cloud

use sqlx::PgPool;

use crate::auth::rate_limit::RateLimiter;
use crate::config::{Config, EsewaConfig};
use crate::esewa::client::EsewaClient;
use crate::notify::expo::ExpoClient;
use crate::price_feed::PriceFeed;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    /// JWT secret for user authentication
    pub jwt_secret: String,
    /// eSewa merchant settings
    pub esewa: EsewaConfig,
    /// eSewa transaction status API
    pub esewa_client: EsewaClient,
    /// Expo push API, used by the outbox worker
    pub expo: ExpoClient,
    /// Cached Kalimati price proxy
    pub price_feed: PriceFeed,
    /// Rate limiter for login/registration routes
    pub rate_limiter: RateLimiter,
    /// Idle time after which an active negotiation expires
    pub negotiation_ttl_ms: i64,
}

impl AppState {
    /// Create a new AppState, connecting and migrating the database
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self::with_pool(pool, config))
    }

    /// Build the state around an existing pool
    pub fn with_pool(pool: PgPool, config: &Config) -> Self {
        let http = reqwest::Client::new();
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            esewa: config.esewa.clone(),
            esewa_client: EsewaClient::new(http.clone(), config.esewa.status_url.clone()),
            expo: ExpoClient::new(http.clone(), config.expo_push_url.clone()),
            price_feed: PriceFeed::new(http, config.kalimati_price_url.clone()),
            rate_limiter: RateLimiter::new(),
            negotiation_ttl_ms: config.negotiation_ttl_hours * 3_600_000,
        }
    }
}

//! Server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// eSewa's published UAT secret, only used when ENVIRONMENT=development
const ESEWA_UAT_SECRET: &str = "8gBm/:&EnhH.1/q";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// JWT secret for user authentication
    pub jwt_secret: String,
    /// eSewa merchant settings
    pub esewa: EsewaConfig,
    /// Expo push API endpoint
    pub expo_push_url: String,
    /// Kalimati daily price API endpoint
    pub kalimati_price_url: String,
    /// Active negotiations with no new offer for this long expire
    pub negotiation_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct EsewaConfig {
    pub secret_key: String,
    pub product_code: String,
    /// Form endpoint the client posts the signed payload to
    pub form_url: String,
    /// Transaction status lookup endpoint
    pub status_url: String,
    pub success_url: String,
    pub failure_url: String,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        Self::require_secret_or(name, environment, &format!("dev-{name}-not-for-production"))
    }

    fn require_secret_or(
        name: &str,
        environment: &str,
        dev_default: &str,
    ) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                dev_default.to_string()
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn env_or(name: &str, default: &str) -> String {
        std::env::var(name).unwrap_or_else(|_| default.into())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = Self::env_or("ENVIRONMENT", "development");

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            esewa: EsewaConfig {
                secret_key: Self::require_secret_or(
                    "ESEWA_SECRET_KEY",
                    &environment,
                    ESEWA_UAT_SECRET,
                )?,
                product_code: Self::env_or("ESEWA_PRODUCT_CODE", "EPAYTEST"),
                form_url: Self::env_or(
                    "ESEWA_FORM_URL",
                    "https://rc-epay.esewa.com.np/api/epay/main/v2/form",
                ),
                status_url: Self::env_or(
                    "ESEWA_STATUS_URL",
                    "https://rc.esewa.com.np/api/epay/transaction/status/",
                ),
                success_url: Self::env_or(
                    "ESEWA_SUCCESS_URL",
                    "http://localhost:5173/payment/esewa/success",
                ),
                failure_url: Self::env_or(
                    "ESEWA_FAILURE_URL",
                    "http://localhost:5173/payment/esewa/failure",
                ),
            },
            expo_push_url: Self::env_or("EXPO_PUSH_URL", "https://exp.host/--/api/v2/push/send"),
            kalimati_price_url: Self::env_or(
                "KALIMATI_PRICE_URL",
                "https://kalimatimarket.gov.np/api/daily-prices/en",
            ),
            negotiation_ttl_hours: std::env::var("NEGOTIATION_TTL_HOURS")
                .ok()
                .and_then(|h| h.parse().ok())
                .filter(|h: &i64| *h > 0)
                .unwrap_or(72),
            environment,
        })
    }
}

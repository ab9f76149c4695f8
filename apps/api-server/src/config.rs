//! Application configuration loaded from environment variables.

use std::env;

use forno_infra::RateLimitSettings;
use forno_infra::auth::JwtConfig;
use forno_infra::database::DatabaseConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: Option<DatabaseConfig>,
    pub jwt: JwtConfig,
    /// Refresh-token validity in days. Rotation renews the window; an
    /// untouched session dies after this long.
    pub refresh_token_days: i64,
    pub rate_limit: RateLimitSettings,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database = env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
            url,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        });

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database,
            jwt: JwtConfig::from_env(),
            refresh_token_days: env::var("REFRESH_TOKEN_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            rate_limit: RateLimitSettings::from_env(),
        }
    }
}

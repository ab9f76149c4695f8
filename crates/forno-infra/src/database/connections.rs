use std::time::Duration;

#[cfg(feature = "postgres")]
use sea_orm::{ConnectOptions, Database, DbConn, DbErr};

/// Configuration for the database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// The database connection pool.
///
/// Refresh-token records live here so rotation state survives process
/// restarts and is shared across server instances.
#[cfg(feature = "postgres")]
pub struct DatabaseConnection {
    pub conn: DbConn,
}

#[cfg(not(feature = "postgres"))]
pub struct DatabaseConnection;

#[cfg(feature = "postgres")]
impl DatabaseConnection {
    /// Initialize the connection pool from configuration.
    pub async fn init(config: &DatabaseConfig) -> Result<Self, DbErr> {
        tracing::info!("Initializing database connection...");

        let opts = ConnectOptions::new(&config.url)
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(true)
            .to_owned();

        let conn = Database::connect(opts).await?;
        tracing::info!(pool = config.max_connections, "Database connected");

        Ok(Self { conn })
    }
}

//! Application state - shared across all handlers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::RwLock;

use forno_core::domain::User;
use forno_core::error::StoreError;
use forno_core::ports::{
    BaseRepository, PasswordService, RateLimiter, RefreshTokenStore, TokenService, UserRepository,
};
use forno_core::session::{RotationEngine, SessionIssuer};
use forno_infra::{
    Argon2PasswordService, InMemoryTokenStore, JwtAccessTokenService, RateLimitSettings,
    TokenBucketLimiter,
};

#[cfg(feature = "postgres")]
use forno_infra::database::{DatabaseConnection, PostgresTokenStore, PostgresUserRepository};

use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn RefreshTokenStore>,
    pub token_service: Arc<dyn TokenService>,
    pub issuer: Arc<SessionIssuer>,
    pub rotation: Arc<RotationEngine>,
    pub limiter: Arc<dyn RateLimiter>,
    pub rate_limit: RateLimitSettings,
    /// Present only for the in-process limiter; the background sweep task
    /// holds a clone of this handle.
    pub sweeper: Option<Arc<TokenBucketLimiter>>,
}

/// In-memory user repository for when the database is not configured.
/// Accounts vanish on restart; fine for local development, nothing else.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<uuid::Uuid, User>>,
}

#[async_trait::async_trait]
impl BaseRepository<User, uuid::Uuid> for InMemoryUserRepository {
    async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn save(&self, user: User) -> Result<User, StoreError> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: uuid::Uuid) -> Result<(), StoreError> {
        self.users.write().await.remove(&id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Self {
        let token_service: Arc<dyn TokenService> =
            Arc::new(JwtAccessTokenService::new(config.jwt.clone()));
        let passwords: Arc<dyn PasswordService> = Arc::new(Argon2PasswordService::new());

        #[cfg(feature = "postgres")]
        let (users, tokens): (Arc<dyn UserRepository>, Arc<dyn RefreshTokenStore>) = {
            if let Some(db_config) = &config.database {
                match DatabaseConnection::init(db_config).await {
                    Ok(db) => {
                        // One pool, shared by both stores.
                        let conn = Arc::new(db.conn);
                        (
                            Arc::new(PostgresUserRepository::new(conn.clone())),
                            Arc::new(PostgresTokenStore::new(conn)),
                        )
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to connect to database: {}. Using in-memory fallback.",
                            e
                        );
                        in_memory_stores()
                    }
                }
            } else {
                tracing::warn!("DATABASE_URL not set. Running without database (in-memory mode).");
                in_memory_stores()
            }
        };

        #[cfg(not(feature = "postgres"))]
        let (users, tokens): (Arc<dyn UserRepository>, Arc<dyn RefreshTokenStore>) = {
            tracing::info!("Running without postgres feature - using in-memory stores");
            in_memory_stores()
        };

        let refresh_validity = Duration::days(config.refresh_token_days);
        let issuer = Arc::new(SessionIssuer::new(
            users.clone(),
            passwords,
            tokens.clone(),
            token_service.clone(),
            refresh_validity,
        ));
        let rotation = Arc::new(RotationEngine::new(
            tokens.clone(),
            users.clone(),
            token_service.clone(),
            refresh_validity,
        ));

        let rate_limit = config.rate_limit.clone();
        let (limiter, sweeper) = build_limiter(rate_limit.clone()).await;

        tracing::info!("Application state initialized");

        Self {
            users,
            tokens,
            token_service,
            issuer,
            rotation,
            limiter,
            rate_limit,
            sweeper,
        }
    }
}

fn in_memory_stores() -> (Arc<dyn UserRepository>, Arc<dyn RefreshTokenStore>) {
    (
        Arc::new(InMemoryUserRepository::default()),
        Arc::new(InMemoryTokenStore::new()),
    )
}

/// Pick the limiter backend. Redis when the feature is on and a server is
/// reachable, otherwise the in-process bucket map (plus its sweeper handle).
async fn build_limiter(
    settings: RateLimitSettings,
) -> (Arc<dyn RateLimiter>, Option<Arc<TokenBucketLimiter>>) {
    #[cfg(feature = "redis")]
    {
        use forno_infra::{RedisRateLimitConfig, RedisTokenBucketLimiter};

        if std::env::var("REDIS_URL").is_ok() {
            match RedisTokenBucketLimiter::new(RedisRateLimitConfig::from_env(), settings.clone())
                .await
            {
                Ok(limiter) => {
                    tracing::info!("Using Redis rate-limit backend");
                    return (Arc::new(limiter), None);
                }
                Err(e) => {
                    tracing::error!(
                        "Redis rate-limit backend unavailable: {}. Using in-process buckets.",
                        e
                    );
                }
            }
        }
    }

    let limiter = Arc::new(TokenBucketLimiter::new(settings));
    (limiter.clone(), Some(limiter))
}

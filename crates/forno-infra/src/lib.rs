//! # Forno Infrastructure
//!
//! Concrete implementations of the ports defined in `forno-core`.
//! This crate contains the token-bucket limiters, token stores, database
//! repositories, and authentication services.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `postgres` - PostgreSQL persistence via SeaORM
//! - `auth` - JWT + Argon2 authentication
//! - `rate-limit` - Token-bucket admission control
//! - `redis` - Redis-backed buckets for multi-instance deployments

pub mod database;
pub mod token_store;

#[cfg(feature = "auth")]
pub mod auth;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

// Re-exports - In-Memory
pub use database::DatabaseConnection;
pub use token_store::InMemoryTokenStore;

#[cfg(feature = "auth")]
pub use auth::{Argon2PasswordService, JwtAccessTokenService};

#[cfg(feature = "rate-limit")]
pub use rate_limit::{BucketConfig, FailPolicy, RateLimitSettings, TokenBucketLimiter};

// Re-exports - Redis
#[cfg(all(feature = "redis", feature = "rate-limit"))]
pub use rate_limit::{RedisRateLimitConfig, RedisTokenBucketLimiter};

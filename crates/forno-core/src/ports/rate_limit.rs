//! Rate limiting port.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

/// The per-caller identity a bucket is keyed on. Derived per request,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Authenticated caller, keyed by user id.
    User(Uuid),
    /// Anonymous caller, keyed by client address.
    Ip(String),
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::User(id) => write!(f, "user:{id}"),
            RateLimitKey::Ip(addr) => write!(f, "ip:{addr}"),
        }
    }
}

/// Rate limiter trait - abstraction over admission-control backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Refill the caller's bucket, then try to consume one token.
    ///
    /// `path` selects an endpoint-specific bucket configuration when a
    /// registered prefix matches; otherwise the default applies.
    async fn check(
        &self,
        key: &RateLimitKey,
        path: &str,
    ) -> Result<RateLimitDecision, RateLimitError>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole tokens left in the bucket after this check.
    pub remaining: u32,
    /// How long until one token is available again. Zero when allowed.
    pub retry_after: Duration,
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),
}

//! Refresh-token store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::RefreshToken;
use crate::error::StoreError;

/// Durable store for issued refresh tokens, keyed by opaque token value.
///
/// `rotate` is the optimistic-concurrency point of the whole rotation
/// protocol: it must succeed for at most one of any set of concurrent
/// callers presenting the same token.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Look up a token by its opaque value.
    async fn find(&self, token_value: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Persist a newly issued token.
    async fn insert(&self, token: RefreshToken) -> Result<(), StoreError>;

    /// In one atomic step: transition `token_value` from Active to Rotated,
    /// record `next` as its successor, and insert `next`. Returns `false`
    /// (inserting nothing) if the token was not Active at the moment of the
    /// update - a concurrent rotation won the race. Atomicity here is what
    /// keeps a breach cascade from missing a successor created mid-flight.
    async fn rotate(&self, token_value: &str, next: RefreshToken) -> Result<bool, StoreError>;

    /// Set a single token to Revoked. Idempotent; unknown tokens are a no-op.
    async fn revoke(&self, token_value: &str) -> Result<(), StoreError>;

    /// Revoke every token in a family. Returns the number of rows touched.
    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, StoreError>;
}

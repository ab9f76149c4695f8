//! Authentication ports.

use uuid::Uuid;

/// Claims carried by a stateless access token.
///
/// Access tokens are never persisted and never individually revocable;
/// revocation happens only at the refresh-token family level, so their
/// lifetime is the revocation propagation bound.
#[derive(Debug, Clone)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub email: String,
    pub exp: i64,
}

/// Token service trait for access-token operations.
pub trait TokenService: Send + Sync {
    /// Generate a short-lived access token for a user.
    fn generate_token(&self, user_id: Uuid, email: &str) -> Result<String, AuthError>;

    /// Validate and decode an access token.
    fn validate_token(&self, token: &str) -> Result<AccessClaims, AuthError>;

    /// Access-token validity in seconds, for `expires_in` responses.
    fn expiration_seconds(&self) -> i64;
}

/// Password hashing service.
pub trait PasswordService: Send + Sync {
    /// Hash a plain text password.
    fn hash(&self, password: &str) -> Result<String, AuthError>;

    /// Verify a password against a hash.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing authorization header")]
    MissingAuth,

    #[error("Hashing error: {0}")]
    HashingError(String),
}

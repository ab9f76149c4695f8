//! Session issuance - login and registration.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use crate::domain::{RefreshToken, User};
use crate::error::{StoreError, TokenError};
use crate::ports::{PasswordService, RefreshTokenStore, TokenService, UserRepository};
use crate::session::rotation::{TokenPair, build_pair};

/// Errors from login and registration.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Credential processing failed: {0}")]
    Credential(String),
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Store(e) => SessionError::Store(e),
            other => SessionError::Credential(other.to_string()),
        }
    }
}

/// Produces access+refresh token pairs at login and registration.
///
/// Every login starts a brand-new token family; the refresh token is the
/// only revocable credential, the access token is stateless.
pub struct SessionIssuer {
    users: Arc<dyn UserRepository>,
    passwords: Arc<dyn PasswordService>,
    tokens: Arc<dyn RefreshTokenStore>,
    access: Arc<dyn TokenService>,
    refresh_validity: Duration,
}

impl SessionIssuer {
    pub fn new(
        users: Arc<dyn UserRepository>,
        passwords: Arc<dyn PasswordService>,
        tokens: Arc<dyn RefreshTokenStore>,
        access: Arc<dyn TokenService>,
        refresh_validity: Duration,
    ) -> Self {
        Self {
            users,
            passwords,
            tokens,
            access,
            refresh_validity,
        }
    }

    /// Register a new account and open its first session.
    pub async fn register(&self, email: &str, password: &str) -> Result<(User, TokenPair), SessionError> {
        if self.users.find_by_email(email).await?.is_some() {
            return Err(SessionError::DuplicateEmail);
        }

        let password_hash = self
            .passwords
            .hash(password)
            .map_err(|e| SessionError::Credential(e.to_string()))?;

        let user = User::new(email.to_string(), password_hash);
        let saved = self.users.save(user).await?;
        let pair = self.open_session(&saved).await?;

        tracing::info!(user_id = %saved.id, "User registered");
        Ok((saved, pair))
    }

    /// Check credentials and mint a fresh session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), SessionError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;

        let valid = self
            .passwords
            .verify(password, &user.password_hash)
            .map_err(|e| SessionError::Credential(e.to_string()))?;
        if !valid {
            return Err(SessionError::InvalidCredentials);
        }

        let pair = self.open_session(&user).await?;
        tracing::info!(user_id = %user.id, "Session opened");
        Ok((user, pair))
    }

    async fn open_session(&self, user: &User) -> Result<TokenPair, SessionError> {
        let refresh = RefreshToken::new_family(user.id, self.refresh_validity);
        self.tokens.insert(refresh.clone()).await?;
        Ok(build_pair(self.access.as_ref(), &refresh, &user.email)?)
    }
}

//! Refresh-token rotation state machine.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::{RefreshToken, TokenStatus};
use crate::error::TokenError;
use crate::ports::{RefreshTokenStore, TokenService, UserRepository};

/// An access/refresh token pair handed to the client.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token validity in seconds.
    pub expires_in: u64,
}

/// Validates presented refresh tokens, rotates them, and detects reuse.
///
/// A legitimate client discards a refresh token immediately after using it,
/// so a rotated token showing up again means it was copied. That replay
/// revokes the entire family before the error is returned - the race between
/// the thief and the owner is itself the detection mechanism.
pub struct RotationEngine {
    tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserRepository>,
    access: Arc<dyn TokenService>,
    refresh_validity: Duration,
}

impl RotationEngine {
    pub fn new(
        tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserRepository>,
        access: Arc<dyn TokenService>,
        refresh_validity: Duration,
    ) -> Self {
        Self {
            tokens,
            users,
            access,
            refresh_validity,
        }
    }

    /// Rotate a presented refresh token into a fresh access/refresh pair.
    ///
    /// Exactly one of any set of concurrent calls with the same token can
    /// succeed; the losers observe the Rotated state and take the breach
    /// path.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, TokenError> {
        let record = self
            .tokens
            .find(presented)
            .await?
            .ok_or(TokenError::NotFound)?;

        match record.status {
            TokenStatus::Revoked => {
                // A revoked token that carries a successor was rotated before
                // the family cascade caught it. Presenting it is still a
                // replay, however late it arrives; the cascade is idempotent.
                // Plain logout leaves replaced_by unset.
                if record.replaced_by.is_some() {
                    self.cascade(record.family_id).await?;
                    Err(TokenError::Revoked { breach: true })
                } else {
                    Err(TokenError::Revoked { breach: false })
                }
            }
            TokenStatus::Rotated => {
                // Replay of an already-used token: the defining breach signal.
                self.cascade(record.family_id).await?;
                Err(TokenError::Revoked { breach: true })
            }
            TokenStatus::Active => {
                if record.is_expired(Utc::now()) {
                    return Err(TokenError::Expired);
                }

                let next = record.next_in_family(self.refresh_validity);
                let won = self
                    .tokens
                    .rotate(&record.token_value, next.clone())
                    .await?;

                if !won {
                    // A concurrent rotation got there first; treat this call
                    // as the replay it has become.
                    self.cascade(record.family_id).await?;
                    return Err(TokenError::Revoked { breach: true });
                }

                let user = self
                    .users
                    .find_by_id(record.user_id)
                    .await?
                    .ok_or(TokenError::NotFound)?;
                let access_token = self
                    .access
                    .generate_token(user.id, &user.email)
                    .map_err(|e| TokenError::Issue(e.to_string()))?;

                tracing::debug!(user_id = %user.id, family_id = %record.family_id, "Refresh token rotated");

                Ok(TokenPair {
                    access_token,
                    refresh_token: next.token_value,
                    expires_in: self.access.expiration_seconds() as u64,
                })
            }
        }
    }

    /// Revoke a single token (logout). Terminal and idempotent.
    pub async fn revoke_token(&self, token_value: &str) -> Result<(), TokenError> {
        self.tokens.revoke(token_value).await?;
        Ok(())
    }

    /// Revoke every token in a family (logout-everywhere, breach cascade).
    pub async fn revoke_family(&self, family_id: Uuid) -> Result<u64, TokenError> {
        Ok(self.tokens.revoke_family(family_id).await?)
    }

    async fn cascade(&self, family_id: Uuid) -> Result<(), TokenError> {
        let revoked = self.tokens.revoke_family(family_id).await?;
        tracing::warn!(
            family_id = %family_id,
            revoked,
            "Refresh token reuse detected - family revoked"
        );
        Ok(())
    }
}

/// Helper for issuing a brand-new pair (used by login as well as rotation).
pub(crate) fn build_pair(
    access: &dyn TokenService,
    refresh: &RefreshToken,
    email: &str,
) -> Result<TokenPair, TokenError> {
    let access_token = access
        .generate_token(refresh.user_id, email)
        .map_err(|e| TokenError::Issue(e.to_string()))?;

    Ok(TokenPair {
        access_token,
        refresh_token: refresh.token_value.clone(),
        expires_in: access.expiration_seconds() as u64,
    })
}

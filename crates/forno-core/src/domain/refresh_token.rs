//! Refresh-token record and its lifecycle states.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a refresh token. Transitions are forward-only:
/// Active -> Rotated (on use) or Active/Rotated -> Revoked (logout, breach).
/// A Revoked or expired token never becomes Active again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Rotated,
    Revoked,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Rotated => "rotated",
            TokenStatus::Revoked => "revoked",
        }
    }
}

impl TryFrom<&str> for TokenStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(TokenStatus::Active),
            "rotated" => Ok(TokenStatus::Rotated),
            "revoked" => Ok(TokenStatus::Revoked),
            other => Err(format!("unknown token status: {other}")),
        }
    }
}

/// A persisted refresh token.
///
/// `family_id` groups every token descending from one login via rotation;
/// it never changes across rotations and is the unit of breach revocation.
/// `replaced_by` points at the token that superseded this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token_value: String,
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub status: TokenStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub replaced_by: Option<String>,
}

impl RefreshToken {
    /// Mint the first token of a brand new family (login).
    pub fn new_family(user_id: Uuid, validity: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_value: generate_token_value(),
            user_id,
            family_id: Uuid::new_v4(),
            status: TokenStatus::Active,
            issued_at: now,
            expires_at: now + validity,
            replaced_by: None,
        }
    }

    /// Mint the successor of this token within the same family (rotation).
    pub fn next_in_family(&self, validity: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_value: generate_token_value(),
            user_id: self.user_id,
            family_id: self.family_id,
            status: TokenStatus::Active,
            issued_at: now,
            expires_at: now + validity,
            replaced_by: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Generate an opaque, URL-safe token value from 32 random bytes.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_family_starts_active() {
        let token = RefreshToken::new_family(Uuid::new_v4(), Duration::days(30));

        assert_eq!(token.status, TokenStatus::Active);
        assert!(token.replaced_by.is_none());
        assert!(!token.is_expired(Utc::now()));
    }

    #[test]
    fn test_next_in_family_keeps_lineage() {
        let first = RefreshToken::new_family(Uuid::new_v4(), Duration::days(30));
        let second = first.next_in_family(Duration::days(30));

        assert_eq!(second.family_id, first.family_id);
        assert_eq!(second.user_id, first.user_id);
        assert_ne!(second.token_value, first.token_value);
        assert_eq!(second.status, TokenStatus::Active);
    }

    #[test]
    fn test_expiry() {
        let mut token = RefreshToken::new_family(Uuid::new_v4(), Duration::seconds(1));
        token.expires_at = Utc::now() - Duration::seconds(1);

        assert!(token.is_expired(Utc::now()));
    }

    #[test]
    fn test_token_values_are_unique() {
        let a = generate_token_value();
        let b = generate_token_value();

        assert_ne!(a, b);
        assert!(a.len() >= 42); // 32 bytes base64url
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TokenStatus::Active,
            TokenStatus::Rotated,
            TokenStatus::Revoked,
        ] {
            assert_eq!(TokenStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(TokenStatus::try_from("stale").is_err());
    }
}

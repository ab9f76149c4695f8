//! In-memory refresh-token store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use forno_core::domain::{RefreshToken, TokenStatus};
use forno_core::error::StoreError;
use forno_core::ports::RefreshTokenStore;

/// HashMap-backed token store for DB-less operation and tests.
///
/// Every mutation takes the single write lock, so `rotate` is atomic: no
/// interleaving between the status check, the transition, and the successor
/// insert. State is lost on process restart.
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryTokenStore {
    async fn find(&self, token_value: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tokens.read().await.get(token_value).cloned())
    }

    async fn insert(&self, token: RefreshToken) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_value) {
            return Err(StoreError::Constraint("token value already exists".into()));
        }
        tokens.insert(token.token_value.clone(), token);
        Ok(())
    }

    async fn rotate(&self, token_value: &str, next: RefreshToken) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.write().await;
        let won = match tokens.get_mut(token_value) {
            Some(token) if token.status == TokenStatus::Active => {
                token.status = TokenStatus::Rotated;
                token.replaced_by = Some(next.token_value.clone());
                true
            }
            _ => false,
        };
        if won {
            tokens.insert(next.token_value.clone(), next);
        }
        Ok(won)
    }

    async fn revoke(&self, token_value: &str) -> Result<(), StoreError> {
        if let Some(token) = self.tokens.write().await.get_mut(token_value) {
            token.status = TokenStatus::Revoked;
        }
        Ok(())
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, StoreError> {
        let mut count = 0;
        for token in self.tokens.write().await.values_mut() {
            if token.family_id == family_id && token.status != TokenStatus::Revoked {
                token.status = TokenStatus::Revoked;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn active_token() -> RefreshToken {
        RefreshToken::new_family(Uuid::new_v4(), Duration::days(30))
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryTokenStore::new();
        let token = active_token();

        store.insert(token.clone()).await.unwrap();

        let found = store.find(&token.token_value).await.unwrap().unwrap();
        assert_eq!(found.family_id, token.family_id);
        assert!(store.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryTokenStore::new();
        let token = active_token();

        store.insert(token.clone()).await.unwrap();
        let err = store.insert(token).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_rotate_wins_only_once() {
        let store = InMemoryTokenStore::new();
        let token = active_token();
        store.insert(token.clone()).await.unwrap();

        let next = token.next_in_family(Duration::days(30));
        assert!(store.rotate(&token.token_value, next.clone()).await.unwrap());

        // Second attempt observes the Rotated state and loses; its successor
        // is never inserted.
        let other = token.next_in_family(Duration::days(30));
        assert!(!store.rotate(&token.token_value, other.clone()).await.unwrap());
        assert!(store.find(&other.token_value).await.unwrap().is_none());

        let stored = store.find(&token.token_value).await.unwrap().unwrap();
        assert_eq!(stored.status, TokenStatus::Rotated);
        assert_eq!(stored.replaced_by.as_deref(), Some(next.token_value.as_str()));
        assert_eq!(
            store.find(&next.token_value).await.unwrap().unwrap().status,
            TokenStatus::Active
        );
    }

    #[tokio::test]
    async fn test_revoke_family_touches_only_that_family() {
        let store = InMemoryTokenStore::new();
        let ours = active_token();
        let theirs = active_token();
        store.insert(ours.clone()).await.unwrap();
        store.insert(theirs.clone()).await.unwrap();

        let revoked = store.revoke_family(ours.family_id).await.unwrap();
        assert_eq!(revoked, 1);

        let other = store.find(&theirs.token_value).await.unwrap().unwrap();
        assert_eq!(other.status, TokenStatus::Active);
    }
}

#[cfg(all(test, feature = "auth"))]
mod rotation_tests {
    //! End-to-end rotation against the real store, exercising the
    //! concurrent-rotation race.

    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    use forno_core::TokenError;
    use forno_core::domain::{RefreshToken, TokenStatus, User};
    use forno_core::error::StoreError;
    use forno_core::ports::{BaseRepository, RefreshTokenStore, UserRepository};
    use forno_core::session::RotationEngine;

    use crate::auth::{JwtAccessTokenService, JwtConfig};

    use super::InMemoryTokenStore;

    struct SingleUserRepo(User);

    #[async_trait]
    impl BaseRepository<User, Uuid> for SingleUserRepo {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            Ok((self.0.id == id).then(|| self.0.clone()))
        }
        async fn save(&self, user: User) -> Result<User, StoreError> {
            Ok(user)
        }
        async fn delete(&self, _id: Uuid) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepository for SingleUserRepo {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            Ok((self.0.email == email).then(|| self.0.clone()))
        }
    }

    fn engine(store: Arc<InMemoryTokenStore>, user: User) -> Arc<RotationEngine> {
        Arc::new(RotationEngine::new(
            store,
            Arc::new(SingleUserRepo(user)),
            Arc::new(JwtAccessTokenService::new(JwtConfig {
                secret: "test-secret".into(),
                validity_minutes: 15,
                issuer: "test".into(),
            })),
            Duration::days(30),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_rotations_exactly_one_wins() {
        let store = Arc::new(InMemoryTokenStore::new());
        let user = User::new("peppe@example.com".into(), "hash".into());
        let token = RefreshToken::new_family(user.id, Duration::days(30));
        store.insert(token.clone()).await.unwrap();
        let engine = engine(store.clone(), user);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let value = token.token_value.clone();
            handles.push(tokio::spawn(async move { engine.rotate(&value).await }));
        }

        let mut successes = 0;
        let mut breaches = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(TokenError::Revoked { breach: true }) => breaches += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(breaches, 7);

        // The breach path revoked the whole family, winner's token included.
        for value in collect_family_values(&store, token.family_id).await {
            let record = store.find(&value).await.unwrap().unwrap();
            assert_ne!(record.status, TokenStatus::Active);
        }
    }

    #[tokio::test]
    async fn test_replay_after_rotation_revokes_family() {
        let store = Arc::new(InMemoryTokenStore::new());
        let user = User::new("anna@example.com".into(), "hash".into());
        let t1 = RefreshToken::new_family(user.id, Duration::days(30));
        store.insert(t1.clone()).await.unwrap();
        let engine = engine(store.clone(), user);

        let pair = engine.rotate(&t1.token_value).await.unwrap();

        let err = engine.rotate(&t1.token_value).await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked { breach: true }));

        let t2 = store.find(&pair.refresh_token).await.unwrap().unwrap();
        assert_eq!(t2.status, TokenStatus::Revoked);

        // And the revoked successor stays dead, without a second cascade.
        let err = engine.rotate(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked { breach: false }));
    }

    async fn collect_family_values(store: &InMemoryTokenStore, family: Uuid) -> Vec<String> {
        let mut values = Vec::new();
        for token in store.tokens.read().await.values() {
            if token.family_id == family {
                values.push(token.token_value.clone());
            }
        }
        values
    }
}

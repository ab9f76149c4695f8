//! In-memory fakes shared by the session tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{RefreshToken, TokenStatus, User};
use crate::error::StoreError;
use crate::ports::{
    AccessClaims, AuthError, BaseRepository, PasswordService, RefreshTokenStore, TokenService,
    UserRepository,
};

pub struct InMemoryStore {
    tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn find(&self, token_value: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tokens.lock().unwrap().get(token_value).cloned())
    }

    async fn insert(&self, token: RefreshToken) -> Result<(), StoreError> {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.token_value.clone(), token);
        Ok(())
    }

    async fn rotate(&self, token_value: &str, next: RefreshToken) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        let won = match tokens.get_mut(token_value) {
            Some(t) if t.status == TokenStatus::Active => {
                t.status = TokenStatus::Rotated;
                t.replaced_by = Some(next.token_value.clone());
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
        if let Some(t) = self.tokens.lock().unwrap().get_mut(token_value) {
            t.status = TokenStatus::Revoked;
        }
        Ok(())
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, StoreError> {
        let mut count = 0;
        for t in self.tokens.lock().unwrap().values_mut() {
            if t.family_id == family_id && t.status != TokenStatus::Revoked {
                t.status = TokenStatus::Revoked;
                count += 1;
            }
        }
        Ok(count)
    }
}

pub struct InMemoryUsers {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl BaseRepository<User, Uuid> for InMemoryUsers {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn save(&self, user: User) -> Result<User, StoreError> {
        self.add(user.clone());
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.users.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

pub struct FakeTokenService;

impl TokenService for FakeTokenService {
    fn generate_token(&self, user_id: Uuid, _email: &str) -> Result<String, AuthError> {
        Ok(format!("access:{user_id}"))
    }

    fn validate_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let id = token
            .strip_prefix("access:")
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AuthError::InvalidToken("bad fake token".into()))?;
        Ok(AccessClaims {
            user_id: id,
            email: String::new(),
            exp: 0,
        })
    }

    fn expiration_seconds(&self) -> i64 {
        900
    }
}

pub struct PlainPasswords;

impl PasswordService for PlainPasswords {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        Ok(hash == format!("plain:{password}"))
    }
}

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::User;
use crate::error::StoreError;

/// Generic repository trait defining standard CRUD operations.
#[async_trait]
pub trait BaseRepository<T, ID>: Send + Sync {
    /// Find an entity by its unique ID.
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, StoreError>;

    /// Save an entity (create or update).
    async fn save(&self, entity: T) -> Result<T, StoreError>;

    /// Delete an entity by its ID.
    async fn delete(&self, id: ID) -> Result<(), StoreError>;
}

/// User repository with domain-specific methods.
#[async_trait]
pub trait UserRepository: BaseRepository<User, Uuid> {
    /// Find a user by their email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

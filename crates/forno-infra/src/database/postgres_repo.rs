//! PostgreSQL repository implementations.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, TransactionTrait,
};
use uuid::Uuid;

use forno_core::domain::{RefreshToken, TokenStatus, User};
use forno_core::error::StoreError;
use forno_core::ports::{RefreshTokenStore, UserRepository};

use super::entity::refresh_token::{self, Entity as RefreshTokenEntity};
use super::entity::user::{self, Entity as UserEntity};
use super::postgres_base::PostgresBaseRepository;

/// PostgreSQL user repository.
pub type PostgresUserRepository = PostgresBaseRepository<UserEntity>;

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        // Mask email for logging to avoid PII in logs
        let masked = if let Some(at_pos) = email.find('@') {
            let (local, domain) = email.split_at(at_pos);
            let masked_local = if local.len() > 1 {
                format!("{}***", &local[..1])
            } else {
                "***".to_string()
            };
            format!("{}{}", masked_local, domain)
        } else {
            "***".to_string()
        };
        tracing::debug!(user_email = %masked, "Finding user by email");

        let result = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.map(Into::into))
    }
}

/// PostgreSQL refresh-token store.
///
/// `rotate` relies on a conditional `UPDATE .. WHERE status = 'active'`
/// inside a transaction: row-level locking makes the Active->Rotated
/// transition exclusive, and the successor insert commits with it or not at
/// all.
pub struct PostgresTokenStore {
    db: Arc<DbConn>,
}

impl PostgresTokenStore {
    pub fn new(db: Arc<DbConn>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresTokenStore {
    async fn find(&self, token_value: &str) -> Result<Option<RefreshToken>, StoreError> {
        let result = RefreshTokenEntity::find_by_id(token_value)
            .one(self.db.as_ref())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        result
            .map(RefreshToken::try_from)
            .transpose()
            .map_err(StoreError::Query)
    }

    async fn insert(&self, token: RefreshToken) -> Result<(), StoreError> {
        let active: refresh_token::ActiveModel = token.into();
        active.insert(self.db.as_ref()).await.map_err(|e| {
            let err_str = e.to_string();
            if err_str.contains("duplicate") || err_str.contains("unique") {
                StoreError::Constraint("token value already exists".to_string())
            } else {
                StoreError::Query(err_str)
            }
        })?;
        Ok(())
    }

    async fn rotate(&self, token_value: &str, next: RefreshToken) -> Result<bool, StoreError> {
        let token_value = token_value.to_string();
        let next_value = next.token_value.clone();
        let next_active: refresh_token::ActiveModel = next.into();

        let won = self
            .db
            .transaction::<_, bool, DbErr>(move |txn| {
                Box::pin(async move {
                    let updated = RefreshTokenEntity::update_many()
                        .col_expr(
                            refresh_token::Column::Status,
                            Expr::value(TokenStatus::Rotated.as_str()),
                        )
                        .col_expr(
                            refresh_token::Column::ReplacedBy,
                            Expr::value(Some(next_value)),
                        )
                        .filter(refresh_token::Column::TokenValue.eq(token_value))
                        .filter(refresh_token::Column::Status.eq(TokenStatus::Active.as_str()))
                        .exec(txn)
                        .await?;

                    if updated.rows_affected == 0 {
                        // Not Active at the moment of the update - lost the race.
                        return Ok(false);
                    }

                    next_active.insert(txn).await?;
                    Ok(true)
                })
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(won)
    }

    async fn revoke(&self, token_value: &str) -> Result<(), StoreError> {
        // Idempotent by construction: zero rows affected is still success.
        RefreshTokenEntity::update_many()
            .col_expr(
                refresh_token::Column::Status,
                Expr::value(TokenStatus::Revoked.as_str()),
            )
            .filter(refresh_token::Column::TokenValue.eq(token_value))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, StoreError> {
        let result = RefreshTokenEntity::update_many()
            .col_expr(
                refresh_token::Column::Status,
                Expr::value(TokenStatus::Revoked.as_str()),
            )
            .filter(refresh_token::Column::FamilyId.eq(family_id))
            .filter(refresh_token::Column::Status.ne(TokenStatus::Revoked.as_str()))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

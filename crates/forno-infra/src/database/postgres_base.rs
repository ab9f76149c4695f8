use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, DbConn, EntityTrait, IntoActiveModel, PrimaryKeyTrait, TryIntoModel,
};

use forno_core::error::StoreError;
use forno_core::ports::BaseRepository;

/// Generic PostgreSQL repository implementation.
///
/// The pool is shared by reference; callers hand the same `Arc<DbConn>` to
/// every store built on it.
pub struct PostgresBaseRepository<E>
where
    E: EntityTrait,
{
    pub(crate) db: Arc<DbConn>,
    _entity: PhantomData<E>,
}

impl<E> PostgresBaseRepository<E>
where
    E: EntityTrait,
{
    pub fn new(db: Arc<DbConn>) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E, T, ID> BaseRepository<T, ID> for PostgresBaseRepository<E>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel> + Sync + Send,
    E::ActiveModel: ActiveModelTrait<Entity = E> + TryIntoModel<E::Model> + Send + Sync,
    E::PrimaryKey: PrimaryKeyTrait<ValueType = ID>,
    ID: Send + Sync + Into<sea_orm::Value> + Clone + Copy + 'static,
    T: From<E::Model> + Into<E::ActiveModel> + Send + Sync + 'static,
{
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, StoreError> {
        let result = E::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.map(Into::into))
    }

    async fn save(&self, entity: T) -> Result<T, StoreError> {
        let active_model: E::ActiveModel = entity.into();
        let result = active_model.save(self.db.as_ref()).await.map_err(|e| {
            let err_str = e.to_string();
            if err_str.contains("duplicate") || err_str.contains("unique") {
                StoreError::Constraint("Entity already exists".to_string())
            } else {
                StoreError::Query(err_str)
            }
        })?;

        // `save` hands back an ActiveModel; round-trip through the Model to
        // recover the domain type.
        let model = result
            .try_into_model()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(model.into())
    }

    async fn delete(&self, id: ID) -> Result<(), StoreError> {
        let result = E::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}

//! Refresh-token entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

use forno_core::domain::{RefreshToken, TokenStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    /// The opaque token value handed to the client.
    #[sea_orm(primary_key, auto_increment = false)]
    pub token_value: String,
    pub user_id: Uuid,
    /// Rotation lineage - invariant across rotations within one login.
    pub family_id: Uuid,
    pub status: String,
    pub issued_at: DateTimeWithTimeZone,
    pub expires_at: DateTimeWithTimeZone,
    pub replaced_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Conversion from SeaORM Model to the domain record. Fails on a status
/// value the domain does not know.
impl TryFrom<Model> for RefreshToken {
    type Error = String;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            status: TokenStatus::try_from(model.status.as_str())?,
            token_value: model.token_value,
            user_id: model.user_id,
            family_id: model.family_id,
            issued_at: model.issued_at.into(),
            expires_at: model.expires_at.into(),
            replaced_by: model.replaced_by,
        })
    }
}

/// Conversion from the domain record to SeaORM ActiveModel.
impl From<RefreshToken> for ActiveModel {
    fn from(token: RefreshToken) -> Self {
        Self {
            token_value: Set(token.token_value),
            user_id: Set(token.user_id),
            family_id: Set(token.family_id),
            status: Set(token.status.as_str().to_string()),
            issued_at: Set(token.issued_at.into()),
            expires_at: Set(token.expires_at.into()),
            replaced_by: Set(token.replaced_by),
        }
    }
}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account record.
///
/// `email` is stored lower-cased so the unique index is effectively
/// case-insensitive. `is_active = false` soft-disables the account.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub email: String,

    /// Encoded output of the configured password hasher. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub display_name: String,

    pub avatar_url: Option<String>,

    pub is_active: bool,

    /// Unix timestamp (seconds).
    pub last_login_at: Option<i64>,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

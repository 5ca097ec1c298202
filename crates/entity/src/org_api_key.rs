use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Organization-scoped API key.
///
/// `key_prefix` is the clear leading slice of the secret used for candidate
/// lookup; `key_hash` is the hex SHA-256 of the full secret.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub organization_id: i32,

    pub name: String,

    pub key_prefix: String,

    #[serde(skip_serializing)]
    pub key_hash: String,

    /// JSON array of permission scopes. `None` means unrestricted.
    pub permissions: Option<String>,

    /// Unix timestamp (seconds).
    pub last_used_at: Option<i64>,

    /// Unix timestamp (seconds). `None` never expires.
    pub expires_at: Option<i64>,

    pub created_by: i32,

    /// Unix timestamp (seconds). Soft delete.
    pub revoked_at: Option<i64>,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

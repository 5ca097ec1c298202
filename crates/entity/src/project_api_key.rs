use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project-scoped API key.
///
/// `organization_id` is denormalized from the project so scope checks need a
/// single row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: i32,
    pub organization_id: i32,

    pub name: String,

    pub key_prefix: String,

    #[serde(skip_serializing)]
    pub key_hash: String,

    pub permissions: Option<String>,

    /// Unix timestamp (seconds).
    pub last_used_at: Option<i64>,

    /// Unix timestamp (seconds).
    pub expires_at: Option<i64>,

    pub created_by: i32,

    /// Unix timestamp (seconds).
    pub revoked_at: Option<i64>,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Row-level security policy. `condition` is a predicate fragment owned by the
/// query engine, e.g. `org_id = @user_org_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rls_policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: i32,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub condition: String,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Mapping table for policies <-> semantic models.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rls_policy_models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub rls_policy_id: i32,
    pub model_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

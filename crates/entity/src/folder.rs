use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    #[sea_orm(string_value = "personal")]
    Personal,
    #[sea_orm(string_value = "public")]
    Public,
    #[sea_orm(string_value = "custom")]
    Custom,
}

impl FolderType {
    /// Personal and public folders are created and managed by the system.
    pub fn is_system(self) -> bool {
        matches!(self, FolderType::Personal | FolderType::Public)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum FolderVisibility {
    #[sea_orm(string_value = "private")]
    Private,
    #[sea_orm(string_value = "shared")]
    Shared,
}

/// Folder grouping dashboards, threads and spreadsheets inside a project.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "folders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: i32,

    pub name: String,

    pub r#type: FolderType,

    pub owner_id: i32,

    pub visibility: FolderVisibility,

    pub sort_order: i32,

    /// `personal:<owner_id>` or `public` for system folders, `None` for custom
    /// folders. Unique per project, which is what makes bootstrap idempotent.
    pub system_key: Option<String>,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

pub fn personal_system_key(owner_id: i32) -> String {
    format!("personal:{owner_id}")
}

pub const PUBLIC_SYSTEM_KEY: &str = "public";

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

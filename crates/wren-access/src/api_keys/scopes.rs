use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use entity::{org_api_key, organization, project, project_api_key};

use super::permissions::Permissions;
use super::{ApiKeyRecord, KeyOwner, KeyRow};
use crate::error::{Error, Result};

/// Storage for one family of API keys.
///
/// `target` is the id of whatever the family is scoped to: an organization
/// for [`OrgKeys`], a project for [`ProjectKeys`].
#[async_trait]
pub trait KeyScope: Send + Sync + 'static {
    /// Leading tag of every secret in this family, without the dash.
    const TAG: &'static str;

    async fn owner_of(db: &DatabaseConnection, target: i32) -> Result<KeyOwner>;

    async fn insert(db: &DatabaseConnection, owner: KeyOwner, row: KeyRow) -> Result<ApiKeyRecord>;

    async fn find(db: &DatabaseConnection, id: i32) -> Result<Option<ApiKeyRecord>>;

    /// Non-revoked keys sharing `prefix`.
    async fn candidates(db: &DatabaseConnection, prefix: &str) -> Result<Vec<ApiKeyRecord>>;

    async fn list(db: &DatabaseConnection, target: i32) -> Result<Vec<ApiKeyRecord>>;

    /// Rows affected; zero when the key was already revoked.
    async fn mark_revoked(db: &DatabaseConnection, id: i32, now: i64) -> Result<u64>;

    async fn mark_used(db: &DatabaseConnection, id: i32, now: i64) -> Result<()>;

    async fn delete(db: &DatabaseConnection, target: i32, id: i32) -> Result<u64>;
}

/// Organization-wide keys (`osk-…`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OrgKeys;

/// Keys confined to one project (`psk-…`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectKeys;

impl From<org_api_key::Model> for ApiKeyRecord {
    fn from(m: org_api_key::Model) -> Self {
        Self {
            id: m.id,
            owner: KeyOwner::Organization {
                organization_id: m.organization_id,
            },
            name: m.name,
            prefix: m.key_prefix,
            key_hash: m.key_hash,
            permissions: Permissions::from_stored(m.permissions.as_deref()),
            last_used_at: m.last_used_at,
            expires_at: m.expires_at,
            created_by: m.created_by,
            revoked_at: m.revoked_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<project_api_key::Model> for ApiKeyRecord {
    fn from(m: project_api_key::Model) -> Self {
        Self {
            id: m.id,
            owner: KeyOwner::Project {
                organization_id: m.organization_id,
                project_id: m.project_id,
            },
            name: m.name,
            prefix: m.key_prefix,
            key_hash: m.key_hash,
            permissions: Permissions::from_stored(m.permissions.as_deref()),
            last_used_at: m.last_used_at,
            expires_at: m.expires_at,
            created_by: m.created_by,
            revoked_at: m.revoked_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[async_trait]
impl KeyScope for OrgKeys {
    const TAG: &'static str = "osk";

    async fn owner_of(db: &DatabaseConnection, target: i32) -> Result<KeyOwner> {
        organization::Entity::find_by_id(target)
            .one(db)
            .await?
            .map(|o| KeyOwner::Organization { organization_id: o.id })
            .ok_or_else(|| Error::not_found("organization"))
    }

    async fn insert(db: &DatabaseConnection, owner: KeyOwner, row: KeyRow) -> Result<ApiKeyRecord> {
        let created = org_api_key::ActiveModel {
            organization_id: Set(owner.organization_id()),
            name: Set(row.name),
            key_prefix: Set(row.prefix),
            key_hash: Set(row.hash),
            permissions: Set(row.permissions),
            last_used_at: Set(None),
            expires_at: Set(row.expires_at),
            created_by: Set(row.created_by),
            revoked_at: Set(None),
            created_at: Set(row.now),
            updated_at: Set(row.now),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(created.into())
    }

    async fn find(db: &DatabaseConnection, id: i32) -> Result<Option<ApiKeyRecord>> {
        Ok(org_api_key::Entity::find_by_id(id).one(db).await?.map(Into::into))
    }

    async fn candidates(db: &DatabaseConnection, prefix: &str) -> Result<Vec<ApiKeyRecord>> {
        let rows = org_api_key::Entity::find()
            .filter(org_api_key::Column::KeyPrefix.eq(prefix))
            .filter(org_api_key::Column::RevokedAt.is_null())
            .all(db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(db: &DatabaseConnection, target: i32) -> Result<Vec<ApiKeyRecord>> {
        let rows = org_api_key::Entity::find()
            .filter(org_api_key::Column::OrganizationId.eq(target))
            .order_by_desc(org_api_key::Column::CreatedAt)
            .order_by_desc(org_api_key::Column::Id)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_revoked(db: &DatabaseConnection, id: i32, now: i64) -> Result<u64> {
        let res = org_api_key::Entity::update_many()
            .col_expr(org_api_key::Column::RevokedAt, Expr::value(Some(now)))
            .col_expr(org_api_key::Column::UpdatedAt, Expr::value(now))
            .filter(org_api_key::Column::Id.eq(id))
            .filter(org_api_key::Column::RevokedAt.is_null())
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    async fn mark_used(db: &DatabaseConnection, id: i32, now: i64) -> Result<()> {
        org_api_key::Entity::update_many()
            .col_expr(org_api_key::Column::LastUsedAt, Expr::value(Some(now)))
            .filter(org_api_key::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    async fn delete(db: &DatabaseConnection, target: i32, id: i32) -> Result<u64> {
        let res = org_api_key::Entity::delete_many()
            .filter(org_api_key::Column::Id.eq(id))
            .filter(org_api_key::Column::OrganizationId.eq(target))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl KeyScope for ProjectKeys {
    const TAG: &'static str = "psk";

    async fn owner_of(db: &DatabaseConnection, target: i32) -> Result<KeyOwner> {
        project::Entity::find_by_id(target)
            .one(db)
            .await?
            .map(|p| KeyOwner::Project {
                organization_id: p.organization_id,
                project_id: p.id,
            })
            .ok_or_else(|| Error::not_found("project"))
    }

    async fn insert(db: &DatabaseConnection, owner: KeyOwner, row: KeyRow) -> Result<ApiKeyRecord> {
        let KeyOwner::Project { organization_id, project_id } = owner else {
            return Err(Error::Validation("project key requires a project owner".into()));
        };
        let created = project_api_key::ActiveModel {
            project_id: Set(project_id),
            organization_id: Set(organization_id),
            name: Set(row.name),
            key_prefix: Set(row.prefix),
            key_hash: Set(row.hash),
            permissions: Set(row.permissions),
            last_used_at: Set(None),
            expires_at: Set(row.expires_at),
            created_by: Set(row.created_by),
            revoked_at: Set(None),
            created_at: Set(row.now),
            updated_at: Set(row.now),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(created.into())
    }

    async fn find(db: &DatabaseConnection, id: i32) -> Result<Option<ApiKeyRecord>> {
        Ok(project_api_key::Entity::find_by_id(id).one(db).await?.map(Into::into))
    }

    async fn candidates(db: &DatabaseConnection, prefix: &str) -> Result<Vec<ApiKeyRecord>> {
        let rows = project_api_key::Entity::find()
            .filter(project_api_key::Column::KeyPrefix.eq(prefix))
            .filter(project_api_key::Column::RevokedAt.is_null())
            .all(db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(db: &DatabaseConnection, target: i32) -> Result<Vec<ApiKeyRecord>> {
        let rows = project_api_key::Entity::find()
            .filter(project_api_key::Column::ProjectId.eq(target))
            .order_by_desc(project_api_key::Column::CreatedAt)
            .order_by_desc(project_api_key::Column::Id)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_revoked(db: &DatabaseConnection, id: i32, now: i64) -> Result<u64> {
        let res = project_api_key::Entity::update_many()
            .col_expr(project_api_key::Column::RevokedAt, Expr::value(Some(now)))
            .col_expr(project_api_key::Column::UpdatedAt, Expr::value(now))
            .filter(project_api_key::Column::Id.eq(id))
            .filter(project_api_key::Column::RevokedAt.is_null())
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    async fn mark_used(db: &DatabaseConnection, id: i32, now: i64) -> Result<()> {
        project_api_key::Entity::update_many()
            .col_expr(project_api_key::Column::LastUsedAt, Expr::value(Some(now)))
            .filter(project_api_key::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    async fn delete(db: &DatabaseConnection, target: i32, id: i32) -> Result<u64> {
        let res = project_api_key::Entity::delete_many()
            .filter(project_api_key::Column::Id.eq(id))
            .filter(project_api_key::Column::ProjectId.eq(target))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}

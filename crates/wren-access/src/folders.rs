use std::collections::{HashMap, HashSet};

use log::{debug, info};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use entity::folder::{self, personal_system_key, FolderType, FolderVisibility, PUBLIC_SYSTEM_KEY};
use entity::folder_access::{self, FolderAccessRole};
use entity::{dashboard, project, spreadsheet, thread};

use crate::context::AccessContext;
use crate::error::{is_unique_violation, Error, Result};
use crate::tenancy::find_member;

const PERSONAL_FOLDER_NAME: &str = "Personal";
const PUBLIC_FOLDER_NAME: &str = "Public";
const MAX_FOLDER_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Dashboard,
    Thread,
    Spreadsheet,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Dashboard => "dashboard",
            ItemKind::Thread => "thread",
            ItemKind::Spreadsheet => "spreadsheet",
        }
    }
}

/// Where an item lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLocation {
    pub project_id: i32,
    pub folder_id: Option<i32>,
}

/// Effective access of one user to one folder. Ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderAccessLevel {
    None,
    Read,
    Write,
}

impl FolderAccessLevel {
    pub fn can_read(self) -> bool {
        self >= FolderAccessLevel::Read
    }

    pub fn can_write(self) -> bool {
        self >= FolderAccessLevel::Write
    }
}

/// Access of `user_id` to `folder`.
///
/// Non-members of the project's organization get nothing. The owner can
/// always write, grants add read or write, public folders are readable by
/// every member and shared custom folders likewise. Private folders stay
/// invisible to everyone else.
pub fn access_level(
    folder: &folder::Model,
    user_id: i32,
    is_member: bool,
    grant: Option<FolderAccessRole>,
) -> FolderAccessLevel {
    if !is_member {
        return FolderAccessLevel::None;
    }
    if folder.owner_id == user_id {
        return FolderAccessLevel::Write;
    }

    let granted = match grant {
        Some(FolderAccessRole::Editor) => FolderAccessLevel::Write,
        Some(FolderAccessRole::Viewer) => FolderAccessLevel::Read,
        None => FolderAccessLevel::None,
    };
    let ambient = match (folder.r#type, folder.visibility) {
        (FolderType::Public, _) => FolderAccessLevel::Read,
        (FolderType::Custom, FolderVisibility::Shared) => FolderAccessLevel::Read,
        _ => FolderAccessLevel::None,
    };
    granted.max(ambient)
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemFolders {
    pub personal: folder::Model,
    pub public: folder::Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessibleFolder {
    #[serde(flatten)]
    pub folder: folder::Model,
    pub access: FolderAccessLevel,
}

/// Folders, per-user grants and item placement.
#[derive(Debug, Clone)]
pub struct FolderAccessController {
    ctx: AccessContext,
}

impl FolderAccessController {
    pub(crate) fn new(ctx: AccessContext) -> Self {
        Self { ctx }
    }

    /// Make sure `user_id` has a personal folder in the project and that the
    /// project has its public folder.
    ///
    /// Safe to race: each folder carries a unique system key, so a losing
    /// insert falls back to reading the winner's row.
    pub async fn ensure_system_folders(&self, project_id: i32, user_id: i32) -> Result<SystemFolders> {
        let proj = self.require_project(project_id).await?;
        if find_member(&self.ctx.db, proj.organization_id, user_id).await?.is_none() {
            return Err(Error::Forbidden("not a member of this project's organization".into()));
        }

        let personal = self
            .insert_or_fetch(
                project_id,
                personal_system_key(user_id),
                PERSONAL_FOLDER_NAME,
                FolderType::Personal,
                FolderVisibility::Private,
                user_id,
            )
            .await?;
        let public = self
            .insert_or_fetch(
                project_id,
                PUBLIC_SYSTEM_KEY.to_string(),
                PUBLIC_FOLDER_NAME,
                FolderType::Public,
                FolderVisibility::Shared,
                user_id,
            )
            .await?;

        Ok(SystemFolders { personal, public })
    }

    /// Create a custom folder at the end of the project's ordering.
    pub async fn create_folder(
        &self,
        project_id: i32,
        owner_id: i32,
        name: &str,
        visibility: FolderVisibility,
    ) -> Result<folder::Model> {
        let name = folder_name(name)?;
        let proj = self.require_project(project_id).await?;
        if find_member(&self.ctx.db, proj.organization_id, owner_id).await?.is_none() {
            return Err(Error::Forbidden("not a member of this project's organization".into()));
        }

        let now = self.ctx.now();
        let created = folder::ActiveModel {
            project_id: Set(project_id),
            name: Set(name),
            r#type: Set(FolderType::Custom),
            owner_id: Set(owner_id),
            visibility: Set(visibility),
            sort_order: Set(next_sort_order(&self.ctx.db, project_id).await?),
            system_key: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.ctx.db)
        .await?;

        info!("created folder {} in project {}", created.id, project_id);
        Ok(created)
    }

    pub async fn get_folder(&self, folder_id: i32) -> Result<folder::Model> {
        folder::Entity::find_by_id(folder_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("folder"))
    }

    pub async fn rename_folder(&self, folder_id: i32, name: &str) -> Result<folder::Model> {
        let name = folder_name(name)?;
        let found = self.require_custom(folder_id, "renamed").await?;

        let mut active: folder::ActiveModel = found.into();
        active.name = Set(name);
        active.updated_at = Set(self.ctx.now());
        Ok(active.update(&self.ctx.db).await?)
    }

    pub async fn set_visibility(&self, folder_id: i32, visibility: FolderVisibility) -> Result<folder::Model> {
        let found = self.require_custom(folder_id, "re-shared").await?;
        if found.visibility == visibility {
            return Ok(found);
        }

        let mut active: folder::ActiveModel = found.into();
        active.visibility = Set(visibility);
        active.updated_at = Set(self.ctx.now());
        Ok(active.update(&self.ctx.db).await?)
    }

    /// Delete a custom folder. Its grants go with it and its items become
    /// unorganized.
    pub async fn delete_folder(&self, folder_id: i32) -> Result<()> {
        self.require_custom(folder_id, "deleted").await?;

        let txn = self.ctx.db.begin().await?;
        detach_items(&txn, &[folder_id]).await?;
        folder_access::Entity::delete_many()
            .filter(folder_access::Column::FolderId.eq(folder_id))
            .exec(&txn)
            .await?;
        folder::Entity::delete_by_id(folder_id).exec(&txn).await?;
        txn.commit().await?;

        info!("deleted folder {folder_id}");
        Ok(())
    }

    /// Grant or change a user's role on a custom folder.
    pub async fn grant_access(&self, folder_id: i32, user_id: i32, role: FolderAccessRole) -> Result<folder_access::Model> {
        let found = self.require_custom(folder_id, "shared with individual users").await?;
        if found.owner_id == user_id {
            return Err(Error::Validation("the folder owner already has full access".into()));
        }
        let proj = self.require_project(found.project_id).await?;
        if find_member(&self.ctx.db, proj.organization_id, user_id).await?.is_none() {
            return Err(Error::Validation(
                "access can only be granted to members of the project's organization".into(),
            ));
        }

        let now = self.ctx.now();
        let row = folder_access::ActiveModel {
            folder_id: Set(folder_id),
            user_id: Set(user_id),
            role: Set(role),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        folder_access::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([folder_access::Column::FolderId, folder_access::Column::UserId])
                    .update_columns([folder_access::Column::Role, folder_access::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.ctx.db)
            .await?;

        debug!("folder {folder_id}: user {user_id} granted {role:?}");
        find_grant(&self.ctx.db, folder_id, user_id)
            .await?
            .ok_or_else(|| Error::not_found("folder access"))
    }

    pub async fn revoke_access(&self, folder_id: i32, user_id: i32) -> Result<()> {
        let res = folder_access::Entity::delete_many()
            .filter(folder_access::Column::FolderId.eq(folder_id))
            .filter(folder_access::Column::UserId.eq(user_id))
            .exec(&self.ctx.db)
            .await?;
        if res.rows_affected == 0 {
            return Err(Error::not_found("folder access"));
        }
        debug!("folder {folder_id}: user {user_id} access revoked");
        Ok(())
    }

    pub async fn list_access(&self, folder_id: i32) -> Result<Vec<folder_access::Model>> {
        self.get_folder(folder_id).await?;
        Ok(folder_access::Entity::find()
            .filter(folder_access::Column::FolderId.eq(folder_id))
            .order_by_asc(folder_access::Column::Id)
            .all(&self.ctx.db)
            .await?)
    }

    /// Place an item in a folder of its own project, or unorganize it with
    /// `None`.
    pub async fn move_item_to_folder(&self, kind: ItemKind, item_id: i32, folder_id: Option<i32>) -> Result<()> {
        let location = item_location(&self.ctx.db, kind, item_id).await?;
        if let Some(fid) = folder_id {
            let target = self.get_folder(fid).await?;
            if target.project_id != location.project_id {
                return Err(Error::Validation(format!(
                    "folder {fid} belongs to a different project than {} {item_id}",
                    kind.as_str()
                )));
            }
        }

        let now = self.ctx.now();
        let affected = match kind {
            ItemKind::Dashboard => {
                dashboard::Entity::update_many()
                    .col_expr(dashboard::Column::FolderId, Expr::value(folder_id))
                    .col_expr(dashboard::Column::UpdatedAt, Expr::value(now))
                    .filter(dashboard::Column::Id.eq(item_id))
                    .exec(&self.ctx.db)
                    .await?
            }
            ItemKind::Thread => {
                thread::Entity::update_many()
                    .col_expr(thread::Column::FolderId, Expr::value(folder_id))
                    .col_expr(thread::Column::UpdatedAt, Expr::value(now))
                    .filter(thread::Column::Id.eq(item_id))
                    .exec(&self.ctx.db)
                    .await?
            }
            ItemKind::Spreadsheet => {
                spreadsheet::Entity::update_many()
                    .col_expr(spreadsheet::Column::FolderId, Expr::value(folder_id))
                    .col_expr(spreadsheet::Column::UpdatedAt, Expr::value(now))
                    .filter(spreadsheet::Column::Id.eq(item_id))
                    .exec(&self.ctx.db)
                    .await?
            }
        };
        if affected.rows_affected == 0 {
            return Err(Error::not_found("item"));
        }
        Ok(())
    }

    pub async fn item_location(&self, kind: ItemKind, item_id: i32) -> Result<ItemLocation> {
        item_location(&self.ctx.db, kind, item_id).await
    }

    /// Rewrite the project's folder ordering.
    ///
    /// Listed folders take positions `0..n` in the given order; folders left
    /// out follow in their previous relative order. Returns the project's
    /// folders in the new order.
    pub async fn reorder_folders(&self, project_id: i32, ordered_ids: &[i32]) -> Result<Vec<folder::Model>> {
        let mut seen = HashSet::with_capacity(ordered_ids.len());
        if let Some(dup) = ordered_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(Error::Validation(format!("folder {dup} listed twice")));
        }

        let txn = self.ctx.db.begin().await?;
        let current = folder::Entity::find()
            .filter(folder::Column::ProjectId.eq(project_id))
            .order_by_asc(folder::Column::SortOrder)
            .order_by_asc(folder::Column::Id)
            .all(&txn)
            .await?;

        let mut by_id: HashMap<i32, folder::Model> = current.iter().map(|f| (f.id, f.clone())).collect();
        let mut next = Vec::with_capacity(current.len());
        for id in ordered_ids {
            match by_id.remove(id) {
                Some(f) => next.push(f),
                None => return Err(Error::not_found("folder")),
            }
        }
        next.extend(current.into_iter().filter(|f| by_id.contains_key(&f.id)));

        let now = self.ctx.now();
        let mut out = Vec::with_capacity(next.len());
        for (position, f) in next.into_iter().enumerate() {
            let position = position as i32;
            if f.sort_order == position {
                out.push(f);
                continue;
            }
            let mut active: folder::ActiveModel = f.into();
            active.sort_order = Set(position);
            active.updated_at = Set(now);
            out.push(active.update(&txn).await?);
        }
        txn.commit().await?;

        debug!("reordered {} folders in project {}", out.len(), project_id);
        Ok(out)
    }

    /// Folders of a project the user can at least read, in display order.
    pub async fn list_accessible_folders(&self, project_id: i32, user_id: i32) -> Result<Vec<AccessibleFolder>> {
        let proj = self.require_project(project_id).await?;
        if find_member(&self.ctx.db, proj.organization_id, user_id).await?.is_none() {
            return Ok(Vec::new());
        }

        let folders = folder::Entity::find()
            .filter(folder::Column::ProjectId.eq(project_id))
            .order_by_asc(folder::Column::SortOrder)
            .order_by_asc(folder::Column::Id)
            .all(&self.ctx.db)
            .await?;
        let grants: HashMap<i32, FolderAccessRole> = folder_access::Entity::find()
            .filter(folder_access::Column::UserId.eq(user_id))
            .filter(folder_access::Column::FolderId.is_in(folders.iter().map(|f| f.id)))
            .all(&self.ctx.db)
            .await?
            .into_iter()
            .map(|g| (g.folder_id, g.role))
            .collect();

        Ok(folders
            .into_iter()
            .filter_map(|f| {
                let access = access_level(&f, user_id, true, grants.get(&f.id).copied());
                access.can_read().then_some(AccessibleFolder { folder: f, access })
            })
            .collect())
    }

    /// Effective access of `user_id` to one folder.
    pub async fn access_for(&self, folder_id: i32, user_id: i32) -> Result<FolderAccessLevel> {
        let found = self.get_folder(folder_id).await?;
        let proj = self.require_project(found.project_id).await?;
        let is_member = find_member(&self.ctx.db, proj.organization_id, user_id)
            .await?
            .is_some();
        let grant = find_grant(&self.ctx.db, folder_id, user_id).await?.map(|g| g.role);
        Ok(access_level(&found, user_id, is_member, grant))
    }

    async fn insert_or_fetch(
        &self,
        project_id: i32,
        system_key: String,
        name: &str,
        r#type: FolderType,
        visibility: FolderVisibility,
        owner_id: i32,
    ) -> Result<folder::Model> {
        if let Some(existing) = find_system_folder(&self.ctx.db, project_id, &system_key).await? {
            return Ok(existing);
        }

        let now = self.ctx.now();
        let row = folder::ActiveModel {
            project_id: Set(project_id),
            name: Set(name.to_string()),
            r#type: Set(r#type),
            owner_id: Set(owner_id),
            visibility: Set(visibility),
            sort_order: Set(next_sort_order(&self.ctx.db, project_id).await?),
            system_key: Set(Some(system_key.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match row.insert(&self.ctx.db).await {
            Ok(created) => {
                info!("created {:?} folder {} in project {}", r#type, created.id, project_id);
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("lost {system_key} bootstrap race in project {project_id}");
                find_system_folder(&self.ctx.db, project_id, &system_key)
                    .await?
                    .ok_or_else(|| Error::Conflict(format!("system folder {system_key} vanished")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn require_project(&self, project_id: i32) -> Result<project::Model> {
        project::Entity::find_by_id(project_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("project"))
    }

    async fn require_custom(&self, folder_id: i32, action: &str) -> Result<folder::Model> {
        let found = self.get_folder(folder_id).await?;
        if found.r#type.is_system() {
            return Err(Error::InvariantViolation(format!(
                "system folders cannot be {action}"
            )));
        }
        Ok(found)
    }
}

/// Unorganize every item filed under `folder_ids`.
pub(crate) async fn detach_items<C: ConnectionTrait>(conn: &C, folder_ids: &[i32]) -> Result<()> {
    let unset: Option<i32> = None;
    dashboard::Entity::update_many()
        .col_expr(dashboard::Column::FolderId, Expr::value(unset))
        .filter(dashboard::Column::FolderId.is_in(folder_ids.iter().copied()))
        .exec(conn)
        .await?;
    thread::Entity::update_many()
        .col_expr(thread::Column::FolderId, Expr::value(unset))
        .filter(thread::Column::FolderId.is_in(folder_ids.iter().copied()))
        .exec(conn)
        .await?;
    spreadsheet::Entity::update_many()
        .col_expr(spreadsheet::Column::FolderId, Expr::value(unset))
        .filter(spreadsheet::Column::FolderId.is_in(folder_ids.iter().copied()))
        .exec(conn)
        .await?;
    Ok(())
}

pub(crate) async fn item_location<C: ConnectionTrait>(conn: &C, kind: ItemKind, item_id: i32) -> Result<ItemLocation> {
    let found = match kind {
        ItemKind::Dashboard => dashboard::Entity::find_by_id(item_id)
            .one(conn)
            .await?
            .map(|d| (d.project_id, d.folder_id)),
        ItemKind::Thread => thread::Entity::find_by_id(item_id)
            .one(conn)
            .await?
            .map(|t| (t.project_id, t.folder_id)),
        ItemKind::Spreadsheet => spreadsheet::Entity::find_by_id(item_id)
            .one(conn)
            .await?
            .map(|s| (s.project_id, s.folder_id)),
    };
    found
        .map(|(project_id, folder_id)| ItemLocation { project_id, folder_id })
        .ok_or_else(|| Error::not_found(kind.as_str()))
}

async fn find_system_folder(db: &DatabaseConnection, project_id: i32, key: &str) -> Result<Option<folder::Model>> {
    Ok(folder::Entity::find()
        .filter(folder::Column::ProjectId.eq(project_id))
        .filter(folder::Column::SystemKey.eq(key))
        .one(db)
        .await?)
}

async fn find_grant(db: &DatabaseConnection, folder_id: i32, user_id: i32) -> Result<Option<folder_access::Model>> {
    Ok(folder_access::Entity::find()
        .filter(folder_access::Column::FolderId.eq(folder_id))
        .filter(folder_access::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

async fn next_sort_order(db: &DatabaseConnection, project_id: i32) -> Result<i32> {
    let last = folder::Entity::find()
        .filter(folder::Column::ProjectId.eq(project_id))
        .order_by_desc(folder::Column::SortOrder)
        .one(db)
        .await?;
    Ok(last.map(|f| f.sort_order + 1).unwrap_or(0))
}

fn folder_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("folder name cannot be blank".into()));
    }
    if name.chars().count() > MAX_FOLDER_NAME_LEN {
        return Err(Error::Validation(format!(
            "folder name is longer than {MAX_FOLDER_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(r#type: FolderType, visibility: FolderVisibility, owner_id: i32) -> folder::Model {
        folder::Model {
            id: 1,
            project_id: 1,
            name: "f".into(),
            r#type,
            owner_id,
            visibility,
            sort_order: 0,
            system_key: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn owner_writes_private_folder_others_see_nothing() {
        let f = folder(FolderType::Custom, FolderVisibility::Private, 7);
        assert_eq!(access_level(&f, 7, true, None), FolderAccessLevel::Write);
        assert_eq!(access_level(&f, 8, true, None), FolderAccessLevel::None);
    }

    #[test]
    fn grants_open_private_folders() {
        let f = folder(FolderType::Custom, FolderVisibility::Private, 7);
        assert_eq!(
            access_level(&f, 8, true, Some(FolderAccessRole::Viewer)),
            FolderAccessLevel::Read
        );
        assert_eq!(
            access_level(&f, 8, true, Some(FolderAccessRole::Editor)),
            FolderAccessLevel::Write
        );
    }

    #[test]
    fn public_folder_is_readable_by_members_only() {
        let f = folder(FolderType::Public, FolderVisibility::Shared, 7);
        assert_eq!(access_level(&f, 8, true, None), FolderAccessLevel::Read);
        assert_eq!(access_level(&f, 8, false, None), FolderAccessLevel::None);
    }

    #[test]
    fn personal_folder_stays_private() {
        let f = folder(FolderType::Personal, FolderVisibility::Private, 7);
        assert_eq!(access_level(&f, 7, true, None), FolderAccessLevel::Write);
        assert_eq!(access_level(&f, 8, true, None), FolderAccessLevel::None);
    }

    #[test]
    fn shared_custom_folder_reads_but_does_not_write() {
        let f = folder(FolderType::Custom, FolderVisibility::Shared, 7);
        let level = access_level(&f, 8, true, None);
        assert!(level.can_read());
        assert!(!level.can_write());
    }

    #[test]
    fn membership_is_required_even_for_the_owner() {
        let f = folder(FolderType::Custom, FolderVisibility::Private, 7);
        assert_eq!(access_level(&f, 7, false, None), FolderAccessLevel::None);
    }
}

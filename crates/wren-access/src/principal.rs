use log::debug;
use serde::Serialize;

use entity::folder::{FolderType, FolderVisibility};
use entity::member::{self, MemberRole};
use entity::project;

use crate::api_keys::{ApiKeyAuthority, ApiKeyRecord, KeyOwner, KeyScope, OrgKeys, Permission, Permissions, ProjectKeys};
use crate::context::AccessContext;
use crate::error::{Error, Result};
use crate::folders::{ItemKind, ItemLocation};
use crate::tenancy::find_member;

/// What a request presented.
#[derive(Clone)]
pub enum Credential {
    Session(String),
    ApiKey(String),
    /// An `Authorization: Bearer` value; API keys are recognized by tag.
    Bearer(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Credential::Session(_) => "Session",
            Credential::ApiKey(_) => "ApiKey",
            Credential::Bearer(_) => "Bearer",
        };
        write!(f, "Credential::{kind}(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    User {
        user_id: i32,
    },
    ApiKey {
        key_id: i32,
        created_by: i32,
        permissions: Permissions,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// Everything the user's memberships reach.
    User,
    Organization { organization_id: i32 },
    Project { organization_id: i32, project_id: i32 },
}

impl Scope {
    fn covers_organization(&self, org_id: i32) -> bool {
        match *self {
            Scope::User => true,
            Scope::Organization { organization_id } => organization_id == org_id,
            Scope::Project { .. } => false,
        }
    }

    fn covers_project(&self, proj: &project::Model) -> bool {
        match *self {
            Scope::User => true,
            Scope::Organization { organization_id } => organization_id == proj.organization_id,
            Scope::Project { project_id, .. } => project_id == proj.id,
        }
    }
}

impl From<KeyOwner> for Scope {
    fn from(owner: KeyOwner) -> Self {
        match owner {
            KeyOwner::Organization { organization_id } => Scope::Organization { organization_id },
            KeyOwner::Project {
                organization_id,
                project_id,
            } => Scope::Project {
                organization_id,
                project_id,
            },
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub actor: Actor,
    pub scope: Scope,
}

impl Principal {
    /// The user the caller acts as. For API keys this is the key's creator.
    pub fn user_id(&self) -> i32 {
        match self.actor {
            Actor::User { user_id } => user_id,
            Actor::ApiKey { created_by, .. } => created_by,
        }
    }

    fn from_key(key: ApiKeyRecord) -> Self {
        Self {
            scope: key.owner.into(),
            actor: Actor::ApiKey {
                key_id: key.id,
                created_by: key.created_by,
                permissions: key.permissions,
            },
        }
    }

    fn permits(&self, required: Permission) -> bool {
        match &self.actor {
            Actor::User { .. } => true,
            Actor::ApiKey { permissions, .. } => permissions.allows(required),
        }
    }

    fn is_api_key(&self) -> bool {
        matches!(self.actor, Actor::ApiKey { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Resource {
    Organization(i32),
    Project(i32),
    Folder(i32),
    Item(ItemKind, i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Administer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Turns credentials into principals and answers authorization questions.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    ctx: AccessContext,
}

impl Gatekeeper {
    pub(crate) fn new(ctx: AccessContext) -> Self {
        Self { ctx }
    }

    /// Resolve a credential. Every failure is [`Error::InvalidCredential`].
    pub async fn authenticate(&self, credential: &Credential) -> Result<Principal> {
        match credential {
            Credential::Session(token) => self.session_principal(token).await,
            Credential::ApiKey(secret) => self.key_principal(secret).await,
            Credential::Bearer(value) => {
                let value = value.trim();
                if ApiKeyAuthority::<OrgKeys>::claims(value) || ApiKeyAuthority::<ProjectKeys>::claims(value) {
                    self.key_principal(value).await
                } else {
                    self.session_principal(value).await
                }
            }
        }
    }

    /// Decide whether `principal` may perform `action` on `resource`.
    ///
    /// Missing resources deny rather than error so callers cannot probe for
    /// ids they cannot see.
    pub async fn authorize(&self, principal: &Principal, resource: Resource, action: Action) -> Result<Decision> {
        let allowed = match resource {
            Resource::Organization(org_id) => self.organization_allows(principal, org_id, action).await?,
            Resource::Project(project_id) => match self.project(project_id).await? {
                Some(proj) => self.project_allows(principal, &proj, action).await?,
                None => false,
            },
            Resource::Folder(folder_id) => self.folder_allows(principal, folder_id, action).await?,
            Resource::Item(kind, item_id) => self.item_allows(principal, kind, item_id, action).await?,
        };

        debug!("authorize {:?} {:?} on {:?}: {}", principal.actor, action, resource, allowed);
        Ok(Decision::from_bool(allowed))
    }

    async fn session_principal(&self, token: &str) -> Result<Principal> {
        let (user, _) = self.ctx.credentials().authenticate_session(token).await?;
        Ok(Principal {
            actor: Actor::User { user_id: user.id },
            scope: Scope::User,
        })
    }

    async fn key_principal(&self, secret: &str) -> Result<Principal> {
        if ApiKeyAuthority::<OrgKeys>::claims(secret) {
            return Ok(Principal::from_key(self.ctx.org_keys().verify(secret).await?));
        }
        if ApiKeyAuthority::<ProjectKeys>::claims(secret) {
            return Ok(Principal::from_key(self.ctx.project_keys().verify(secret).await?));
        }
        debug!("api key without a known tag ({} or {})", OrgKeys::TAG, ProjectKeys::TAG);
        Err(Error::InvalidCredential)
    }

    async fn membership(&self, principal: &Principal, org_id: i32) -> Result<Option<member::Model>> {
        find_member(&self.ctx.db, org_id, principal.user_id()).await
    }

    async fn organization_allows(&self, principal: &Principal, org_id: i32, action: Action) -> Result<bool> {
        if !principal.scope.covers_organization(org_id) {
            return Ok(false);
        }
        let Some(m) = self.membership(principal, org_id).await? else {
            return Ok(false);
        };
        Ok(match action {
            Action::Read => true,
            Action::Write | Action::Administer => {
                !principal.is_api_key() && matches!(m.role, MemberRole::Owner | MemberRole::Admin)
            }
        })
    }

    async fn project_allows(&self, principal: &Principal, proj: &project::Model, action: Action) -> Result<bool> {
        if !principal.scope.covers_project(proj) {
            return Ok(false);
        }
        let Some(m) = self.membership(principal, proj.organization_id).await? else {
            return Ok(false);
        };
        Ok(match action {
            Action::Read => principal.permits(Permission::ProjectsRead),
            Action::Write => principal.permits(Permission::ProjectsWrite),
            Action::Administer => {
                !principal.is_api_key() && matches!(m.role, MemberRole::Owner | MemberRole::Admin)
            }
        })
    }

    async fn folder_allows(&self, principal: &Principal, folder_id: i32, action: Action) -> Result<bool> {
        let folders = self.ctx.folders();
        let found = match folders.get_folder(folder_id).await {
            Ok(f) => f,
            Err(Error::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        let Some(proj) = self.project(found.project_id).await? else {
            return Ok(false);
        };
        if !principal.scope.covers_project(&proj) {
            return Ok(false);
        }

        if principal.is_api_key() {
            // Keys see what every member sees, nothing personal.
            let shared = match (found.r#type, found.visibility) {
                (FolderType::Public, _) => true,
                (FolderType::Custom, FolderVisibility::Shared) => true,
                _ => false,
            };
            if !shared || self.membership(principal, proj.organization_id).await?.is_none() {
                return Ok(false);
            }
            return Ok(match action {
                Action::Read => principal.permits(Permission::ProjectsRead),
                Action::Write => principal.permits(Permission::ProjectsWrite),
                Action::Administer => false,
            });
        }

        let level = folders.access_for(folder_id, principal.user_id()).await?;
        Ok(match action {
            Action::Read => level.can_read(),
            Action::Write => level.can_write(),
            Action::Administer => {
                if found.owner_id == principal.user_id() && level.can_write() {
                    true
                } else {
                    self.membership(principal, proj.organization_id)
                        .await?
                        .is_some_and(|m| matches!(m.role, MemberRole::Owner | MemberRole::Admin))
                }
            }
        })
    }

    async fn item_allows(&self, principal: &Principal, kind: ItemKind, item_id: i32, action: Action) -> Result<bool> {
        let location = match self.ctx.folders().item_location(kind, item_id).await {
            Ok(l) => l,
            Err(Error::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        if kind == ItemKind::Thread && principal.is_api_key() {
            let required = match action {
                Action::Read => Permission::ThreadsRead,
                Action::Write | Action::Administer => Permission::ThreadsWrite,
            };
            if !principal.permits(required) {
                return Ok(false);
            }
        }

        match location {
            ItemLocation {
                folder_id: Some(folder_id),
                ..
            } => self.folder_allows(principal, folder_id, action).await,
            ItemLocation { project_id, .. } => match self.project(project_id).await? {
                Some(proj) => self.project_allows(principal, &proj, action).await,
                None => Ok(false),
            },
        }
    }

    async fn project(&self, project_id: i32) -> Result<Option<project::Model>> {
        match self.ctx.tenancy().get_project(project_id).await {
            Ok(p) => Ok(Some(p)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

//! API keys for programmatic access.
//!
//! A secret looks like `osk-<64 hex>` or `psk-<64 hex>`. The tag and the first
//! few body characters are stored in clear as the lookup prefix; the full
//! secret is only ever stored as a SHA-256 digest.

mod permissions;
mod scopes;

use std::collections::HashMap;
use std::marker::PhantomData;

use log::{debug, info, warn};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;

use entity::member::MemberRole;
use entity::user;

use crate::context::AccessContext;
use crate::crypto::{constant_time_eq, hash_secret};
use crate::error::{Error, Result};
use crate::tenancy::find_member;
use crate::util::{hex_encode, random_bytes};

pub use permissions::{Permission, Permissions};
pub use scopes::{KeyScope, OrgKeys, ProjectKeys};

const BODY_BYTES: usize = 32;
const BODY_LEN: usize = BODY_BYTES * 2;

/// What a key is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyOwner {
    Organization { organization_id: i32 },
    Project { organization_id: i32, project_id: i32 },
}

impl KeyOwner {
    pub fn organization_id(&self) -> i32 {
        match *self {
            KeyOwner::Organization { organization_id } | KeyOwner::Project { organization_id, .. } => {
                organization_id
            }
        }
    }

    pub fn project_id(&self) -> Option<i32> {
        match *self {
            KeyOwner::Organization { .. } => None,
            KeyOwner::Project { project_id, .. } => Some(project_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Expired,
    Revoked,
}

/// Stored API key without its digest.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRecord {
    pub id: i32,
    pub owner: KeyOwner,
    pub name: String,
    pub prefix: String,
    #[serde(skip)]
    pub(crate) key_hash: String,
    pub permissions: Permissions,
    pub last_used_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub created_by: i32,
    pub revoked_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ApiKeyRecord {
    pub fn status(&self, now: i64) -> KeyStatus {
        match (self.revoked_at, self.expires_at) {
            (Some(_), _) => KeyStatus::Revoked,
            (None, Some(exp)) if exp <= now => KeyStatus::Expired,
            _ => KeyStatus::Active,
        }
    }

    /// Display form: the clear prefix followed by a fixed mask.
    pub fn masked(&self) -> String {
        format!("{}************", self.prefix)
    }
}

/// Key as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeySummary {
    #[serde(flatten)]
    pub key: ApiKeyRecord,
    pub masked: String,
    pub status: KeyStatus,
    pub creator_email: Option<String>,
}

/// Result of issuing a key. `secret` is not recoverable afterwards.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub record: ApiKeyRecord,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    /// `None` issues an unrestricted key.
    pub permissions: Option<Permissions>,
    pub expires_at: Option<i64>,
    pub created_by: i32,
}

/// Column values for a new key row.
#[derive(Debug)]
pub struct KeyRow {
    pub name: String,
    pub prefix: String,
    pub hash: String,
    pub permissions: Option<String>,
    pub expires_at: Option<i64>,
    pub created_by: i32,
    pub now: i64,
}

/// Issues, verifies and revokes keys of one scope family.
#[derive(Debug, Clone)]
pub struct ApiKeyAuthority<S: KeyScope> {
    ctx: AccessContext,
    _scope: PhantomData<S>,
}

impl<S: KeyScope> ApiKeyAuthority<S> {
    pub(crate) fn new(ctx: AccessContext) -> Self {
        Self {
            ctx,
            _scope: PhantomData,
        }
    }

    /// True when `secret` carries this family's tag.
    pub fn claims(secret: &str) -> bool {
        secret
            .strip_prefix(S::TAG)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    pub async fn issue(&self, target: i32, request: NewApiKey) -> Result<IssuedKey> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("api key name cannot be blank".into()));
        }
        let now = self.ctx.now();
        if request.expires_at.is_some_and(|exp| exp <= now) {
            return Err(Error::Validation("api key expiry must be in the future".into()));
        }

        let owner = S::owner_of(&self.ctx.db, target).await?;
        match find_member(&self.ctx.db, owner.organization_id(), request.created_by).await? {
            Some(m) if matches!(m.role, MemberRole::Owner | MemberRole::Admin) => {}
            _ => {
                return Err(Error::Forbidden(
                    "only organization owners and admins can issue api keys".into(),
                ))
            }
        }

        let secret = format!("{}-{}", S::TAG, hex_encode(&random_bytes(BODY_BYTES)?));
        let prefix = self.prefix_of(&secret).ok_or(Error::InvalidCredential)?;
        let permissions = request.permissions.unwrap_or_default();

        let row = KeyRow {
            name: name.to_string(),
            prefix,
            hash: hash_secret(&secret),
            permissions: permissions.to_stored(),
            expires_at: request.expires_at,
            created_by: request.created_by,
            now,
        };

        let record = S::insert(&self.ctx.db, owner, row).await?;

        info!("issued {} api key {} for {:?}", S::TAG, record.id, record.owner);
        Ok(IssuedKey { record, secret })
    }

    /// Check a presented secret.
    ///
    /// Every candidate sharing the prefix is compared so the time taken does
    /// not depend on which one matched. Malformed, unknown, revoked and expired
    /// secrets, and keys whose creator is disabled, all fail the same way.
    pub async fn verify(&self, secret: &str) -> Result<ApiKeyRecord> {
        let Some(prefix) = self.prefix_of(secret) else {
            return Err(Error::InvalidCredential);
        };
        let digest = hash_secret(secret);

        let mut matched = None;
        for candidate in S::candidates(&self.ctx.db, &prefix).await? {
            if constant_time_eq(&candidate.key_hash, &digest) && matched.is_none() {
                matched = Some(candidate);
            }
        }
        let Some(mut key) = matched else {
            return Err(Error::InvalidCredential);
        };

        let now = self.ctx.now();
        if key.status(now) != KeyStatus::Active {
            debug!("rejected {} api key {}: {:?}", S::TAG, key.id, key.status(now));
            return Err(Error::InvalidCredential);
        }

        let creator = user::Entity::find_by_id(key.created_by)
            .one(&self.ctx.db)
            .await?;
        if !creator.is_some_and(|u| u.is_active) {
            debug!("rejected {} api key {}: creator disabled", S::TAG, key.id);
            return Err(Error::InvalidCredential);
        }

        match S::mark_used(&self.ctx.db, key.id, now).await {
            Ok(()) => key.last_used_at = Some(now),
            Err(e) => warn!("failed to record use of {} api key {}: {e}", S::TAG, key.id),
        }
        Ok(key)
    }

    pub async fn revoke(&self, key_id: i32) -> Result<ApiKeyRecord> {
        let Some(mut key) = S::find(&self.ctx.db, key_id).await? else {
            return Err(Error::not_found("api key"));
        };
        if key.revoked_at.is_some() {
            return Err(Error::Revoked { what: "api key" });
        }

        let now = self.ctx.now();
        if S::mark_revoked(&self.ctx.db, key_id, now).await? == 0 {
            return Err(Error::Revoked { what: "api key" });
        }
        key.revoked_at = Some(now);
        key.updated_at = now;

        info!("revoked {} api key {}", S::TAG, key_id);
        Ok(key)
    }

    /// Hard delete, only when the key belongs to `target`.
    pub async fn delete(&self, target: i32, key_id: i32) -> Result<()> {
        if S::delete(&self.ctx.db, target, key_id).await? == 0 {
            return Err(Error::not_found("api key"));
        }
        info!("deleted {} api key {}", S::TAG, key_id);
        Ok(())
    }

    pub async fn get(&self, key_id: i32) -> Result<ApiKeyRecord> {
        S::find(&self.ctx.db, key_id)
            .await?
            .ok_or_else(|| Error::not_found("api key"))
    }

    /// Keys of `target`, newest first, with their creators' emails.
    pub async fn list(&self, target: i32) -> Result<Vec<ApiKeySummary>> {
        let keys = S::list(&self.ctx.db, target).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut creator_ids: Vec<i32> = keys.iter().map(|k| k.created_by).collect();
        creator_ids.sort_unstable();
        creator_ids.dedup();
        let emails: HashMap<i32, String> = user::Entity::find()
            .filter(user::Column::Id.is_in(creator_ids))
            .all(&self.ctx.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.email))
            .collect();

        let now = self.ctx.now();
        Ok(keys
            .into_iter()
            .map(|key| ApiKeySummary {
                masked: key.masked(),
                status: key.status(now),
                creator_email: emails.get(&key.created_by).cloned(),
                key,
            })
            .collect())
    }

    /// Clear prefix of a well-formed secret of this family.
    fn prefix_of(&self, secret: &str) -> Option<String> {
        let body = secret.strip_prefix(S::TAG)?.strip_prefix('-')?;
        if body.len() != BODY_LEN || !body.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return None;
        }
        let keep = self.ctx.config.api_key_prefix_len.min(BODY_LEN);
        Some(format!("{}-{}", S::TAG, &body[..keep]))
    }
}

impl ApiKeyAuthority<OrgKeys> {
    pub async fn list_by_org(&self, org_id: i32) -> Result<Vec<ApiKeySummary>> {
        self.list(org_id).await
    }
}

impl ApiKeyAuthority<ProjectKeys> {
    pub async fn list_by_project(&self, project_id: i32) -> Result<Vec<ApiKeySummary>> {
        self.list(project_id).await
    }
}

use log::{debug, info};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;

use entity::folder::{self, FolderType};
use entity::member::{self, MemberRole};
use entity::{organization, session, user};

use crate::context::AccessContext;
use crate::crypto::{constant_time_eq, ensure_password_policy, hash_secret};
use crate::error::{conflict_on_unique, Error, Result};
use crate::util::{generate_session_token, is_plausible_email, normalize_email, slug_suffix, slugify};

/// Soft-delete state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn of(user: &user::Model) -> Self {
        if user.is_active {
            AccountStatus::Active
        } else {
            AccountStatus::Disabled
        }
    }
}

/// A freshly created session. `token` is the only copy of the bearer secret.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: session::Model,
}

impl IssuedSession {
    pub fn expires_at(&self) -> i64 {
        self.session.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub user: user::Model,
    pub organization: organization::Model,
    pub session: IssuedSession,
}

/// Partial profile change. `avatar_url: Some(None)` clears the avatar.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<Option<String>>,
}

/// Users, password hashes and login sessions.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    ctx: AccessContext,
}

impl CredentialStore {
    pub(crate) fn new(ctx: AccessContext) -> Self {
        Self { ctx }
    }

    pub async fn create_user(&self, email: &str, password: &str, display_name: &str) -> Result<user::Model> {
        let created = insert_user(&self.ctx, &self.ctx.db, email, password, Some(display_name)).await?;
        info!("created user {}", created.id);
        Ok(created)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&self.ctx.db)
            .await?)
    }

    pub async fn find_by_id(&self, user_id: i32) -> Result<Option<user::Model>> {
        Ok(user::Entity::find_by_id(user_id).one(&self.ctx.db).await?)
    }

    /// Check an email/password pair.
    ///
    /// Unknown email, wrong password and disabled account all return
    /// [`Error::InvalidCredential`]. The unknown-email path still runs one
    /// full verification so it is not measurably faster.
    pub async fn verify_password(&self, email: &str, plaintext: &str) -> Result<user::Model> {
        let Some(found) = self.find_by_email(email).await? else {
            let _ = self.ctx.hasher.verify(plaintext, &self.ctx.decoy_hash);
            return Err(Error::InvalidCredential);
        };

        if !self.ctx.hasher.verify(plaintext, &found.password_hash) {
            return Err(Error::InvalidCredential);
        }
        if AccountStatus::of(&found) == AccountStatus::Disabled {
            debug!("password accepted for disabled user {}", found.id);
            return Err(Error::InvalidCredential);
        }
        Ok(found)
    }

    pub async fn create_session(&self, user_id: i32) -> Result<IssuedSession> {
        self.require_user(user_id).await?;
        let issued = insert_session(&self.ctx, &self.ctx.db, user_id).await?;
        debug!("created session {} for user {}", issued.session.id, user_id);
        Ok(issued)
    }

    /// Look up a live session. Expired rows read as absent; only
    /// [`CredentialStore::delete_expired_sessions`] removes them.
    pub async fn find_session(&self, token: &str) -> Result<Option<session::Model>> {
        let digest = hash_secret(token);
        let found = session::Entity::find()
            .filter(session::Column::TokenHash.eq(digest.clone()))
            .one(&self.ctx.db)
            .await?;

        Ok(found.filter(|s| {
            constant_time_eq(&s.token_hash, &digest) && s.expires_at > self.ctx.now()
        }))
    }

    /// Resolve a session token to its active user.
    pub async fn authenticate_session(&self, token: &str) -> Result<(user::Model, session::Model)> {
        let Some(found) = self.find_session(token).await? else {
            return Err(Error::InvalidCredential);
        };
        match self.find_by_id(found.user_id).await? {
            Some(u) if u.is_active => Ok((u, found)),
            _ => Err(Error::InvalidCredential),
        }
    }

    /// Remove a session. Unknown tokens are not an error; returns whether a
    /// row was deleted.
    pub async fn invalidate_session(&self, token: &str) -> Result<bool> {
        let res = session::Entity::delete_many()
            .filter(session::Column::TokenHash.eq(hash_secret(token)))
            .exec(&self.ctx.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn invalidate_user_sessions(&self, user_id: i32) -> Result<u64> {
        let res = session::Entity::delete_many()
            .filter(session::Column::UserId.eq(user_id))
            .exec(&self.ctx.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Sweep sessions whose expiry has passed.
    pub async fn delete_expired_sessions(&self) -> Result<u64> {
        let res = session::Entity::delete_many()
            .filter(session::Column::ExpiresAt.lte(self.ctx.now()))
            .exec(&self.ctx.db)
            .await?;
        if res.rows_affected > 0 {
            info!("swept {} expired sessions", res.rows_affected);
        }
        Ok(res.rows_affected)
    }

    /// Register a user together with a personal organization they own and a
    /// first session. Nothing is persisted unless all three succeed.
    pub async fn signup(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<SignupOutcome> {
        let txn = self.ctx.db.begin().await?;

        let created = insert_user(&self.ctx, &txn, email, password, display_name).await?;
        let now = self.ctx.now();

        let local = created.email.split('@').next().unwrap_or_default();
        let base = match slugify(local) {
            s if s.is_empty() => "org".to_string(),
            s => s,
        };
        let org = organization::ActiveModel {
            display_name: Set(format!("{}'s Organization", created.display_name)),
            slug: Set(format!("{base}-{}", slug_suffix()?)),
            logo_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| conflict_on_unique(e, "organization slug already taken"))?;

        member::ActiveModel {
            organization_id: Set(org.id),
            user_id: Set(created.id),
            role: Set(MemberRole::Owner),
            invited_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let issued = insert_session(&self.ctx, &txn, created.id).await?;
        txn.commit().await?;

        info!("signed up user {} with organization {}", created.id, org.id);
        Ok(SignupOutcome {
            user: created,
            organization: org,
            session: issued,
        })
    }

    /// Verify credentials, record the login time and open a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(user::Model, IssuedSession)> {
        let found = self.verify_password(email, password).await?;
        let now = self.ctx.now();

        let mut active: user::ActiveModel = found.into();
        active.last_login_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&self.ctx.db).await?;

        let issued = self.create_session(updated.id).await?;
        Ok((updated, issued))
    }

    pub async fn set_active(&self, user_id: i32, is_active: bool) -> Result<user::Model> {
        let found = self.require_user(user_id).await?;
        let mut active: user::ActiveModel = found.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(self.ctx.now());
        let updated = active.update(&self.ctx.db).await?;

        info!("user {} status set to {:?}", user_id, AccountStatus::of(&updated));
        Ok(updated)
    }

    pub async fn update_profile(&self, user_id: i32, update: ProfileUpdate) -> Result<user::Model> {
        let found = self.require_user(user_id).await?;
        let mut active: user::ActiveModel = found.into();

        if let Some(name) = update.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Validation("display name cannot be blank".into()));
            }
            active.display_name = Set(name.to_string());
        }
        if let Some(avatar) = update.avatar_url {
            active.avatar_url = Set(avatar.filter(|a| !a.trim().is_empty()));
        }
        active.updated_at = Set(self.ctx.now());

        Ok(active.update(&self.ctx.db).await?)
    }

    /// Hard-delete a user.
    ///
    /// Refused while the user is the only owner of any organization. Sessions,
    /// memberships, grants and API keys the user created go with the row;
    /// personal folders are removed and their items become unorganized.
    pub async fn delete_user(&self, user_id: i32) -> Result<()> {
        let txn = self.ctx.db.begin().await?;

        if user::Entity::find_by_id(user_id).one(&txn).await?.is_none() {
            return Err(Error::not_found("user"));
        }

        let owned = member::Entity::find()
            .filter(member::Column::UserId.eq(user_id))
            .filter(member::Column::Role.eq(MemberRole::Owner))
            .all(&txn)
            .await?;
        for m in owned {
            let owners = member::Entity::find()
                .filter(member::Column::OrganizationId.eq(m.organization_id))
                .filter(member::Column::Role.eq(MemberRole::Owner))
                .count(&txn)
                .await?;
            if owners <= 1 {
                return Err(Error::InvariantViolation(format!(
                    "user is the only owner of organization {}",
                    m.organization_id
                )));
            }
        }

        let personal: Vec<i32> = folder::Entity::find()
            .filter(folder::Column::OwnerId.eq(user_id))
            .filter(folder::Column::Type.eq(FolderType::Personal))
            .all(&txn)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();
        if !personal.is_empty() {
            crate::folders::detach_items(&txn, &personal).await?;
            folder::Entity::delete_many()
                .filter(folder::Column::Id.is_in(personal))
                .exec(&txn)
                .await?;
        }

        user::Entity::delete_by_id(user_id).exec(&txn).await?;
        txn.commit().await?;

        info!("deleted user {user_id}");
        Ok(())
    }

    async fn require_user(&self, user_id: i32) -> Result<user::Model> {
        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found("user"))
    }
}

async fn insert_user<C: ConnectionTrait>(
    ctx: &AccessContext,
    conn: &C,
    email: &str,
    password: &str,
    display_name: Option<&str>,
) -> Result<user::Model> {
    let email = normalize_email(email);
    if !is_plausible_email(&email) {
        return Err(Error::Validation("email address is malformed".into()));
    }
    ensure_password_policy(password)?;

    let display_name = match display_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => email.split('@').next().unwrap_or_default().to_string(),
    };

    let now = ctx.now();
    let password_hash = ctx.hasher.hash(password)?;

    user::ActiveModel {
        email: Set(email),
        password_hash: Set(password_hash),
        display_name: Set(display_name),
        avatar_url: Set(None),
        is_active: Set(true),
        last_login_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "email already registered"))
}

async fn insert_session<C: ConnectionTrait>(ctx: &AccessContext, conn: &C, user_id: i32) -> Result<IssuedSession> {
    let token = generate_session_token()?;
    let now = ctx.now();

    let stored = session::ActiveModel {
        user_id: Set(user_id),
        token_hash: Set(hash_secret(&token)),
        expires_at: Set(now + ctx.config.session_ttl_secs),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    Ok(IssuedSession { token, session: stored })
}

use std::collections::HashMap;

use log::info;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use entity::member::{self, MemberRole};
use entity::{invitation, organization, project, user};

use crate::context::AccessContext;
use crate::error::{conflict_on_unique, Error, Result};
use crate::util::{generate_invitation_token, is_plausible_email, is_valid_slug, normalize_email};

/// Partial organization change. `logo_url: Some(None)` clears the logo.
#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdate {
    pub display_name: Option<String>,
    pub slug: Option<String>,
    pub logo_url: Option<Option<String>>,
}

/// Organization as seen by one of its members.
#[derive(Debug, Clone)]
pub struct UserOrganization {
    pub organization: organization::Model,
    pub role: MemberRole,
}

/// Organizations, memberships and invitations.
#[derive(Debug, Clone)]
pub struct TenancyGraph {
    ctx: AccessContext,
}

impl TenancyGraph {
    pub(crate) fn new(ctx: AccessContext) -> Self {
        Self { ctx }
    }

    /// Create an organization with `owner_id` as its first owner.
    pub async fn create_organization(
        &self,
        display_name: &str,
        slug: &str,
        logo_url: Option<&str>,
        owner_id: i32,
    ) -> Result<organization::Model> {
        let display_name = required_name(display_name)?;
        let slug = checked_slug(slug)?;

        let txn = self.ctx.db.begin().await?;
        if user::Entity::find_by_id(owner_id).one(&txn).await?.is_none() {
            return Err(Error::not_found("user"));
        }

        let now = self.ctx.now();
        let org = organization::ActiveModel {
            display_name: Set(display_name),
            slug: Set(slug),
            logo_url: Set(logo_url.map(str::to_string)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| conflict_on_unique(e, "organization slug already taken"))?;

        insert_member(&txn, org.id, owner_id, MemberRole::Owner, None, now).await?;
        txn.commit().await?;

        info!("created organization {} owned by user {}", org.id, owner_id);
        Ok(org)
    }

    pub async fn update_organization(&self, org_id: i32, update: OrganizationUpdate) -> Result<organization::Model> {
        let found = self.get_organization(org_id).await?;
        let mut active: organization::ActiveModel = found.into();

        if let Some(name) = update.display_name {
            active.display_name = Set(required_name(&name)?);
        }
        if let Some(slug) = update.slug {
            active.slug = Set(checked_slug(&slug)?);
        }
        if let Some(logo) = update.logo_url {
            active.logo_url = Set(logo);
        }
        active.updated_at = Set(self.ctx.now());

        active
            .update(&self.ctx.db)
            .await
            .map_err(|e| conflict_on_unique(e, "organization slug already taken"))
    }

    /// Delete an organization with its memberships, invitations, API keys and
    /// projects.
    pub async fn delete_organization(&self, org_id: i32) -> Result<()> {
        let res = organization::Entity::delete_by_id(org_id).exec(&self.ctx.db).await?;
        if res.rows_affected == 0 {
            return Err(Error::not_found("organization"));
        }
        info!("deleted organization {org_id}");
        Ok(())
    }

    pub async fn get_organization(&self, org_id: i32) -> Result<organization::Model> {
        organization::Entity::find_by_id(org_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("organization"))
    }

    pub async fn get_organization_by_slug(&self, slug: &str) -> Result<Option<organization::Model>> {
        Ok(organization::Entity::find()
            .filter(organization::Column::Slug.eq(slug.trim().to_ascii_lowercase()))
            .one(&self.ctx.db)
            .await?)
    }

    pub async fn list_user_organizations(&self, user_id: i32) -> Result<Vec<UserOrganization>> {
        let memberships = member::Entity::find()
            .filter(member::Column::UserId.eq(user_id))
            .all(&self.ctx.db)
            .await?;
        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let roles: HashMap<i32, MemberRole> = memberships
            .iter()
            .map(|m| (m.organization_id, m.role))
            .collect();
        let orgs = organization::Entity::find()
            .filter(organization::Column::Id.is_in(roles.keys().copied()))
            .order_by_asc(organization::Column::DisplayName)
            .order_by_asc(organization::Column::Id)
            .all(&self.ctx.db)
            .await?;

        Ok(orgs
            .into_iter()
            .filter_map(|o| {
                roles.get(&o.id).map(|role| UserOrganization {
                    role: *role,
                    organization: o,
                })
            })
            .collect())
    }

    pub async fn get_member(&self, org_id: i32, user_id: i32) -> Result<Option<member::Model>> {
        find_member(&self.ctx.db, org_id, user_id).await
    }

    /// Membership of `user_id` if its role is one of `roles`, otherwise
    /// [`Error::Forbidden`].
    pub async fn require_role(&self, org_id: i32, user_id: i32, roles: &[MemberRole]) -> Result<member::Model> {
        match self.get_member(org_id, user_id).await? {
            Some(m) if roles.contains(&m.role) => Ok(m),
            Some(m) => Err(Error::Forbidden(format!(
                "role {} may not perform this action",
                m.role.as_str()
            ))),
            None => Err(Error::Forbidden("not a member of this organization".into())),
        }
    }

    pub async fn list_members(&self, org_id: i32) -> Result<Vec<member::Model>> {
        Ok(member::Entity::find()
            .filter(member::Column::OrganizationId.eq(org_id))
            .order_by_asc(member::Column::Id)
            .all(&self.ctx.db)
            .await?)
    }

    /// Invite `email` into an organization. The invitation lives for the
    /// configured TTL unless `ttl_secs` overrides it.
    pub async fn invite_member(
        &self,
        org_id: i32,
        email: &str,
        role: MemberRole,
        inviter_id: i32,
        ttl_secs: Option<i64>,
    ) -> Result<invitation::Model> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(Error::Validation("email address is malformed".into()));
        }
        let ttl = ttl_secs.unwrap_or(self.ctx.config.invitation_ttl_secs);
        if ttl <= 0 {
            return Err(Error::Validation("invitation lifetime must be positive".into()));
        }

        self.get_organization(org_id).await?;
        self.require_role(org_id, inviter_id, &[MemberRole::Owner, MemberRole::Admin])
            .await?;

        if let Some(existing) = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&self.ctx.db)
            .await?
        {
            if self.get_member(org_id, existing.id).await?.is_some() {
                return Err(Error::Conflict(format!("{email} is already a member")));
            }
        }

        let now = self.ctx.now();
        let pending = invitation::Entity::find()
            .filter(invitation::Column::OrganizationId.eq(org_id))
            .filter(invitation::Column::Email.eq(email.clone()))
            .filter(invitation::Column::AcceptedAt.is_null())
            .filter(invitation::Column::ExpiresAt.gt(now))
            .count(&self.ctx.db)
            .await?;
        if pending > 0 {
            return Err(Error::Conflict(format!("{email} already has a pending invitation")));
        }

        let created = invitation::ActiveModel {
            organization_id: Set(org_id),
            email: Set(email),
            role: Set(role),
            token: Set(generate_invitation_token()?),
            invited_by: Set(Some(inviter_id)),
            expires_at: Set(now + ttl),
            accepted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.ctx.db)
        .await?;

        info!("invitation {} created for organization {}", created.id, org_id);
        Ok(created)
    }

    /// Redeem an invitation.
    ///
    /// Marking the invitation accepted and inserting the member happen in one
    /// transaction; the acceptance update only matches a row that is still
    /// unaccepted, so a concurrent second accept finds nothing to claim.
    pub async fn accept_invitation(&self, token: &str, user_id: i32) -> Result<member::Model> {
        let now = self.ctx.now();
        let txn = self.ctx.db.begin().await?;

        let Some(inv) = invitation::Entity::find()
            .filter(invitation::Column::Token.eq(token))
            .one(&txn)
            .await?
        else {
            return Err(Error::not_found("invitation"));
        };
        if inv.accepted_at.is_some() {
            return Err(Error::Conflict("invitation already accepted".into()));
        }
        if inv.expires_at <= now {
            return Err(Error::Expired { what: "invitation" });
        }

        let Some(invitee) = user::Entity::find_by_id(user_id).one(&txn).await? else {
            return Err(Error::not_found("user"));
        };
        if invitee.email != inv.email {
            return Err(Error::Forbidden("invitation was issued to a different email".into()));
        }

        let claimed = invitation::Entity::update_many()
            .col_expr(invitation::Column::AcceptedAt, Expr::value(Some(now)))
            .col_expr(invitation::Column::UpdatedAt, Expr::value(now))
            .filter(invitation::Column::Id.eq(inv.id))
            .filter(invitation::Column::AcceptedAt.is_null())
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(Error::Conflict("invitation already accepted".into()));
        }

        let created = insert_member(&txn, inv.organization_id, user_id, inv.role, inv.invited_by, now).await?;
        txn.commit().await?;

        info!(
            "user {} joined organization {} as {}",
            user_id,
            inv.organization_id,
            inv.role.as_str()
        );
        Ok(created)
    }

    pub async fn list_pending_invitations(&self, org_id: i32) -> Result<Vec<invitation::Model>> {
        Ok(invitation::Entity::find()
            .filter(invitation::Column::OrganizationId.eq(org_id))
            .filter(invitation::Column::AcceptedAt.is_null())
            .filter(invitation::Column::ExpiresAt.gt(self.ctx.now()))
            .order_by_asc(invitation::Column::Id)
            .all(&self.ctx.db)
            .await?)
    }

    /// Withdraw an invitation that has not been accepted.
    pub async fn revoke_invitation(&self, invitation_id: i32) -> Result<()> {
        let Some(inv) = invitation::Entity::find_by_id(invitation_id)
            .one(&self.ctx.db)
            .await?
        else {
            return Err(Error::not_found("invitation"));
        };
        if inv.accepted_at.is_some() {
            return Err(Error::InvariantViolation(
                "an accepted invitation cannot be revoked".into(),
            ));
        }

        invitation::Entity::delete_by_id(inv.id).exec(&self.ctx.db).await?;
        info!("revoked invitation {}", inv.id);
        Ok(())
    }

    /// Change a member's role. Demoting the last owner is refused.
    pub async fn change_role(&self, org_id: i32, user_id: i32, new_role: MemberRole) -> Result<member::Model> {
        let txn = self.ctx.db.begin().await?;
        lock_owners(&txn, org_id).await?;

        let Some(current) = find_member(&txn, org_id, user_id).await? else {
            return Err(Error::not_found("member"));
        };
        if current.role == new_role {
            return Ok(current);
        }

        let mut active: member::ActiveModel = current.into();
        active.role = Set(new_role);
        active.updated_at = Set(self.ctx.now());
        let updated = active.update(&txn).await?;

        ensure_has_owner(&txn, org_id).await?;
        txn.commit().await?;

        info!(
            "user {} role in organization {} changed to {}",
            user_id,
            org_id,
            new_role.as_str()
        );
        Ok(updated)
    }

    /// Remove a member. Removing the last owner is refused.
    pub async fn remove_member(&self, org_id: i32, user_id: i32) -> Result<()> {
        let txn = self.ctx.db.begin().await?;
        lock_owners(&txn, org_id).await?;

        let res = member::Entity::delete_many()
            .filter(member::Column::OrganizationId.eq(org_id))
            .filter(member::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            return Err(Error::not_found("member"));
        }

        ensure_has_owner(&txn, org_id).await?;
        txn.commit().await?;

        info!("user {user_id} removed from organization {org_id}");
        Ok(())
    }

    pub async fn get_project(&self, project_id: i32) -> Result<project::Model> {
        project::Entity::find_by_id(project_id)
            .one(&self.ctx.db)
            .await?
            .ok_or_else(|| Error::not_found("project"))
    }
}

pub(crate) async fn find_member<C: ConnectionTrait>(conn: &C, org_id: i32, user_id: i32) -> Result<Option<member::Model>> {
    Ok(member::Entity::find()
        .filter(member::Column::OrganizationId.eq(org_id))
        .filter(member::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

async fn insert_member<C: ConnectionTrait>(
    conn: &C,
    org_id: i32,
    user_id: i32,
    role: MemberRole,
    invited_by: Option<i32>,
    now: i64,
) -> Result<member::Model> {
    member::ActiveModel {
        organization_id: Set(org_id),
        user_id: Set(user_id),
        role: Set(role),
        invited_by: Set(invited_by),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "user is already a member"))
}

/// Takes `FOR UPDATE` locks on the organization's owner rows. Must run before
/// any membership write so concurrent owner changes queue behind each other
/// and the later one counts the earlier one's result. SQLite has no row locks
/// and sea-orm leaves the clause out; its single writer gives the same order.
async fn lock_owners<C: ConnectionTrait>(conn: &C, org_id: i32) -> Result<()> {
    member::Entity::find()
        .filter(member::Column::OrganizationId.eq(org_id))
        .filter(member::Column::Role.eq(MemberRole::Owner))
        .lock_exclusive()
        .all(conn)
        .await?;
    Ok(())
}

/// Runs after the write inside the same transaction; returning an error drops
/// the transaction and with it the write.
async fn ensure_has_owner<C: ConnectionTrait>(conn: &C, org_id: i32) -> Result<()> {
    let owners = member::Entity::find()
        .filter(member::Column::OrganizationId.eq(org_id))
        .filter(member::Column::Role.eq(MemberRole::Owner))
        .count(conn)
        .await?;
    if owners == 0 {
        return Err(Error::InvariantViolation(
            "an organization must keep at least one owner".into(),
        ));
    }
    Ok(())
}

fn required_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("name cannot be blank".into()));
    }
    Ok(name.to_string())
}

fn checked_slug(slug: &str) -> Result<String> {
    let slug = slug.trim().to_ascii_lowercase();
    if !is_valid_slug(&slug) {
        return Err(Error::Validation(
            "slug may only contain lowercase letters, digits and dashes".into(),
        ));
    }
    Ok(slug)
}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::member::MemberRole;

/// Pending or consumed organization invitation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invitations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub organization_id: i32,

    /// Lower-cased invitee email.
    pub email: String,

    pub role: MemberRole,

    #[sea_orm(unique)]
    pub token: String,

    pub invited_by: Option<i32>,

    /// Unix timestamp (seconds).
    pub expires_at: i64,

    /// Unix timestamp (seconds).
    pub accepted_at: Option<i64>,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

impl Model {
    pub fn is_pending(&self, now: i64) -> bool {
        self.accepted_at.is_none() && self.expires_at > now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! Identity, tenancy and access control.
//!
//! Every component hangs off an [`AccessContext`]:
//!
//! ```no_run
//! # async fn demo() -> wren_access::Result<()> {
//! use wren_access::{AccessConfig, AccessContext};
//!
//! let ctx = AccessContext::connect(AccessConfig::from_env()?).await?;
//! let signup = ctx.credentials().signup("ada@example.com", "correct horse", None).await?;
//! let orgs = ctx.tenancy().list_user_organizations(signup.user.id).await?;
//! assert_eq!(orgs.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod api_keys;
pub mod clock;
pub mod config;
pub mod context;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod error;
pub mod folders;
pub mod principal;
pub mod rls;
pub mod tenancy;
pub mod util;

pub use api_keys::{
    ApiKeyAuthority, ApiKeyRecord, ApiKeySummary, IssuedKey, KeyOwner, KeyStatus, NewApiKey, OrgKeys,
    Permission, Permissions, ProjectKeys,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AccessConfig;
pub use context::AccessContext;
pub use credentials::{AccountStatus, CredentialStore, IssuedSession, ProfileUpdate, SignupOutcome};
pub use crypto::{PasswordHasher, Pbkdf2Hasher};
pub use error::{Error, ErrorKind, Result};
pub use folders::{AccessibleFolder, FolderAccessController, FolderAccessLevel, ItemKind, SystemFolders};
pub use principal::{Action, Actor, Credential, Decision, Gatekeeper, Principal, Resource, Scope};
pub use rls::{
    ContextValue, NewPolicy, NewProperty, PolicyDetail, PolicyUpdate, PropertyContext, PropertyUpdate,
    RlsPolicyResolver, SessionValue,
};
pub use tenancy::{OrganizationUpdate, TenancyGraph, UserOrganization};

pub use entity::folder::{FolderType, FolderVisibility};
pub use entity::folder_access::FolderAccessRole;
pub use entity::member::MemberRole;
pub use entity::session_property::PropertyType;

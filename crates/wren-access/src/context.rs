use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::api_keys::{ApiKeyAuthority, OrgKeys, ProjectKeys};
use crate::clock::{Clock, SystemClock};
use crate::config::AccessConfig;
use crate::credentials::CredentialStore;
use crate::crypto::{decoy_hash, PasswordHasher, Pbkdf2Hasher};
use crate::db::db_connect_and_migrate;
use crate::error::Result;
use crate::folders::FolderAccessController;
use crate::principal::Gatekeeper;
use crate::rls::RlsPolicyResolver;
use crate::tenancy::TenancyGraph;

/// Shared handles every component works against.
///
/// Cloning is cheap: the connection is a pool handle and the rest is
/// reference counted. Nothing here caches persisted state.
#[derive(Clone, Debug)]
pub struct AccessContext {
    pub(crate) db: DatabaseConnection,
    pub(crate) config: Arc<AccessConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) hasher: Arc<dyn PasswordHasher>,
    pub(crate) decoy_hash: Arc<str>,
}

impl AccessContext {
    pub fn new(db: DatabaseConnection, config: AccessConfig) -> Result<Self> {
        config.validate()?;
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Pbkdf2Hasher::new(config.password_iterations));
        let decoy = decoy_hash(hasher.as_ref())?;
        Ok(Self {
            db,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            hasher,
            decoy_hash: decoy.into(),
        })
    }

    /// Connect, migrate, and build a context from `config`.
    pub async fn connect(config: AccessConfig) -> Result<Self> {
        let db = db_connect_and_migrate(&config).await?;
        Self::new(db, config)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Result<Self> {
        self.decoy_hash = decoy_hash(hasher.as_ref())?.into();
        self.hasher = hasher;
        Ok(self)
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.clone())
    }

    pub fn tenancy(&self) -> TenancyGraph {
        TenancyGraph::new(self.clone())
    }

    pub fn org_keys(&self) -> ApiKeyAuthority<OrgKeys> {
        ApiKeyAuthority::new(self.clone())
    }

    pub fn project_keys(&self) -> ApiKeyAuthority<ProjectKeys> {
        ApiKeyAuthority::new(self.clone())
    }

    pub fn folders(&self) -> FolderAccessController {
        FolderAccessController::new(self.clone())
    }

    pub fn rls(&self) -> RlsPolicyResolver {
        RlsPolicyResolver::new(self.clone())
    }

    pub fn gatekeeper(&self) -> Gatekeeper {
        Gatekeeper::new(self.clone())
    }
}

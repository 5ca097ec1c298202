pub use sea_orm_migration::prelude::*;

mod m20260301_000001_identity_tables;
mod m20260301_000002_tenancy_tables;
mod m20260301_000003_api_key_tables;
mod m20260301_000004_folder_tables;
mod m20260301_000005_rls_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_identity_tables::Migration),
            Box::new(m20260301_000002_tenancy_tables::Migration),
            Box::new(m20260301_000003_api_key_tables::Migration),
            Box::new(m20260301_000004_folder_tables::Migration),
            Box::new(m20260301_000005_rls_tables::Migration),
        ]
    }
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OrgApiKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrgApiKeys::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrgApiKeys::OrganizationId).integer().not_null())
                    .col(ColumnDef::new(OrgApiKeys::Name).string().not_null())
                    .col(ColumnDef::new(OrgApiKeys::KeyPrefix).string_len(32).not_null())
                    .col(ColumnDef::new(OrgApiKeys::KeyHash).string().not_null())
                    .col(ColumnDef::new(OrgApiKeys::Permissions).text())
                    .col(ColumnDef::new(OrgApiKeys::LastUsedAt).big_integer())
                    .col(ColumnDef::new(OrgApiKeys::ExpiresAt).big_integer())
                    .col(ColumnDef::new(OrgApiKeys::CreatedBy).integer().not_null())
                    .col(ColumnDef::new(OrgApiKeys::RevokedAt).big_integer())
                    .col(ColumnDef::new(OrgApiKeys::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(OrgApiKeys::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_org_api_keys_organization_id")
                            .from(OrgApiKeys::Table, OrgApiKeys::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_org_api_keys_created_by")
                            .from(OrgApiKeys::Table, OrgApiKeys::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_org_api_keys_organization_id")
                    .table(OrgApiKeys::Table)
                    .col(OrgApiKeys::OrganizationId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_org_api_keys_key_prefix")
                    .table(OrgApiKeys::Table)
                    .col(OrgApiKeys::KeyPrefix)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectApiKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectApiKeys::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProjectApiKeys::ProjectId).integer().not_null())
                    .col(ColumnDef::new(ProjectApiKeys::OrganizationId).integer().not_null())
                    .col(ColumnDef::new(ProjectApiKeys::Name).string().not_null())
                    .col(ColumnDef::new(ProjectApiKeys::KeyPrefix).string_len(32).not_null())
                    .col(ColumnDef::new(ProjectApiKeys::KeyHash).string().not_null())
                    .col(ColumnDef::new(ProjectApiKeys::Permissions).text())
                    .col(ColumnDef::new(ProjectApiKeys::LastUsedAt).big_integer())
                    .col(ColumnDef::new(ProjectApiKeys::ExpiresAt).big_integer())
                    .col(ColumnDef::new(ProjectApiKeys::CreatedBy).integer().not_null())
                    .col(ColumnDef::new(ProjectApiKeys::RevokedAt).big_integer())
                    .col(ColumnDef::new(ProjectApiKeys::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(ProjectApiKeys::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_api_keys_project_id")
                            .from(ProjectApiKeys::Table, ProjectApiKeys::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_api_keys_organization_id")
                            .from(ProjectApiKeys::Table, ProjectApiKeys::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_api_keys_created_by")
                            .from(ProjectApiKeys::Table, ProjectApiKeys::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_project_api_keys_project_id")
                    .table(ProjectApiKeys::Table)
                    .col(ProjectApiKeys::ProjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_project_api_keys_key_prefix")
                    .table(ProjectApiKeys::Table)
                    .col(ProjectApiKeys::KeyPrefix)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectApiKeys::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(OrgApiKeys::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum OrgApiKeys {
    Table,
    Id,
    OrganizationId,
    Name,
    KeyPrefix,
    KeyHash,
    Permissions,
    LastUsedAt,
    ExpiresAt,
    CreatedBy,
    RevokedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProjectApiKeys {
    Table,
    Id,
    ProjectId,
    OrganizationId,
    Name,
    KeyPrefix,
    KeyHash,
    Permissions,
    LastUsedAt,
    ExpiresAt,
    CreatedBy,
    RevokedAt,
    CreatedAt,
    UpdatedAt,
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Folders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Folders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Folders::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Folders::Name).string().not_null())
                    .col(
                        ColumnDef::new(Folders::Type)
                            .string()
                            .not_null()
                            .default("custom"),
                    )
                    // No foreign key: the public folder outlives the user who
                    // happened to trigger its creation.
                    .col(ColumnDef::new(Folders::OwnerId).integer().not_null())
                    .col(
                        ColumnDef::new(Folders::Visibility)
                            .string()
                            .not_null()
                            .default("private"),
                    )
                    .col(
                        ColumnDef::new(Folders::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Folders::SystemKey).string())
                    .col(ColumnDef::new(Folders::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Folders::UpdatedAt).big_integer().not_null())
                    // NULL system keys (custom folders) never collide.
                    .index(
                        Index::create()
                            .name("uidx_folders_project_system_key")
                            .col(Folders::ProjectId)
                            .col(Folders::SystemKey)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_folders_project_id")
                            .from(Folders::Table, Folders::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_folders_project_id")
                    .table(Folders::Table)
                    .col(Folders::ProjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolderAccess::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolderAccess::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FolderAccess::FolderId).integer().not_null())
                    .col(ColumnDef::new(FolderAccess::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(FolderAccess::Role)
                            .string()
                            .not_null()
                            .default("viewer"),
                    )
                    .col(ColumnDef::new(FolderAccess::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(FolderAccess::UpdatedAt).big_integer().not_null())
                    .index(
                        Index::create()
                            .name("uidx_folder_access_folder_user")
                            .col(FolderAccess::FolderId)
                            .col(FolderAccess::UserId)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_folder_access_folder_id")
                            .from(FolderAccess::Table, FolderAccess::FolderId)
                            .to(Folders::Table, Folders::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_folder_access_user_id")
                            .from(FolderAccess::Table, FolderAccess::UserId)
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
                    .name("idx_folder_access_user_id")
                    .table(FolderAccess::Table)
                    .col(FolderAccess::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Deleting a folder leaves its items unorganized.
        manager
            .create_table(
                Table::create()
                    .table(Dashboards::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dashboards::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Dashboards::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Dashboards::Name).string().not_null())
                    .col(ColumnDef::new(Dashboards::FolderId).integer())
                    .col(ColumnDef::new(Dashboards::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Dashboards::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dashboards_project_id")
                            .from(Dashboards::Table, Dashboards::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dashboards_folder_id")
                            .from(Dashboards::Table, Dashboards::FolderId)
                            .to(Folders::Table, Folders::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dashboards_folder_id")
                    .table(Dashboards::Table)
                    .col(Dashboards::FolderId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Threads::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Threads::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Threads::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Threads::Name).string().not_null())
                    .col(ColumnDef::new(Threads::FolderId).integer())
                    .col(ColumnDef::new(Threads::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Threads::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_threads_project_id")
                            .from(Threads::Table, Threads::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_threads_folder_id")
                            .from(Threads::Table, Threads::FolderId)
                            .to(Folders::Table, Folders::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_threads_folder_id")
                    .table(Threads::Table)
                    .col(Threads::FolderId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Spreadsheets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Spreadsheets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Spreadsheets::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Spreadsheets::Name).string().not_null())
                    .col(ColumnDef::new(Spreadsheets::FolderId).integer())
                    .col(ColumnDef::new(Spreadsheets::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Spreadsheets::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_spreadsheets_project_id")
                            .from(Spreadsheets::Table, Spreadsheets::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_spreadsheets_folder_id")
                            .from(Spreadsheets::Table, Spreadsheets::FolderId)
                            .to(Folders::Table, Folders::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_spreadsheets_folder_id")
                    .table(Spreadsheets::Table)
                    .col(Spreadsheets::FolderId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Spreadsheets::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Threads::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Dashboards::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(FolderAccess::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Folders::Table).to_owned())
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
enum Projects {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Folders {
    Table,
    Id,
    ProjectId,
    Name,
    Type,
    OwnerId,
    Visibility,
    SortOrder,
    SystemKey,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FolderAccess {
    Table,
    Id,
    FolderId,
    UserId,
    Role,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Dashboards {
    Table,
    Id,
    ProjectId,
    Name,
    FolderId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Threads {
    Table,
    Id,
    ProjectId,
    Name,
    FolderId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Spreadsheets {
    Table,
    Id,
    ProjectId,
    Name,
    FolderId,
    CreatedAt,
    UpdatedAt,
}

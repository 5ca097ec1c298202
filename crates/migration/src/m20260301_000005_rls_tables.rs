use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SessionProperties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionProperties::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SessionProperties::ProjectId).integer().not_null())
                    .col(ColumnDef::new(SessionProperties::Name).string().not_null())
                    .col(
                        ColumnDef::new(SessionProperties::Type)
                            .string_len(16)
                            .not_null()
                            .default("string"),
                    )
                    .col(
                        ColumnDef::new(SessionProperties::Required)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(SessionProperties::DefaultExpr).text())
                    .col(ColumnDef::new(SessionProperties::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(SessionProperties::UpdatedAt).big_integer().not_null())
                    .index(
                        Index::create()
                            .name("uidx_session_properties_project_name")
                            .col(SessionProperties::ProjectId)
                            .col(SessionProperties::Name)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_properties_project_id")
                            .from(SessionProperties::Table, SessionProperties::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserSessionPropertyValues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSessionPropertyValues::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserSessionPropertyValues::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(UserSessionPropertyValues::SessionPropertyId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserSessionPropertyValues::Value).text().not_null())
                    .col(
                        ColumnDef::new(UserSessionPropertyValues::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSessionPropertyValues::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("uidx_user_session_property_values_user_property")
                            .col(UserSessionPropertyValues::UserId)
                            .col(UserSessionPropertyValues::SessionPropertyId)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_session_property_values_user_id")
                            .from(UserSessionPropertyValues::Table, UserSessionPropertyValues::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_session_property_values_property_id")
                            .from(
                                UserSessionPropertyValues::Table,
                                UserSessionPropertyValues::SessionPropertyId,
                            )
                            .to(SessionProperties::Table, SessionProperties::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RlsPolicies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RlsPolicies::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RlsPolicies::ProjectId).integer().not_null())
                    .col(ColumnDef::new(RlsPolicies::Name).string().not_null())
                    .col(ColumnDef::new(RlsPolicies::Condition).text().not_null())
                    .col(ColumnDef::new(RlsPolicies::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(RlsPolicies::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rls_policies_project_id")
                            .from(RlsPolicies::Table, RlsPolicies::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Models live in the semantic layer, so model_id carries no foreign key.
        manager
            .create_table(
                Table::create()
                    .table(RlsPolicyModels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RlsPolicyModels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RlsPolicyModels::RlsPolicyId).integer().not_null())
                    .col(ColumnDef::new(RlsPolicyModels::ModelId).integer().not_null())
                    .index(
                        Index::create()
                            .name("uidx_rls_policy_models_policy_model")
                            .col(RlsPolicyModels::RlsPolicyId)
                            .col(RlsPolicyModels::ModelId)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rls_policy_models_policy_id")
                            .from(RlsPolicyModels::Table, RlsPolicyModels::RlsPolicyId)
                            .to(RlsPolicies::Table, RlsPolicies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rls_policy_models_model_id")
                    .table(RlsPolicyModels::Table)
                    .col(RlsPolicyModels::ModelId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RlsPolicySessionProperties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RlsPolicySessionProperties::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RlsPolicySessionProperties::RlsPolicyId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RlsPolicySessionProperties::SessionPropertyId)
                            .integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("uidx_rls_policy_session_properties_policy_property")
                            .col(RlsPolicySessionProperties::RlsPolicyId)
                            .col(RlsPolicySessionProperties::SessionPropertyId)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rls_policy_session_properties_policy_id")
                            .from(
                                RlsPolicySessionProperties::Table,
                                RlsPolicySessionProperties::RlsPolicyId,
                            )
                            .to(RlsPolicies::Table, RlsPolicies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rls_policy_session_properties_property_id")
                            .from(
                                RlsPolicySessionProperties::Table,
                                RlsPolicySessionProperties::SessionPropertyId,
                            )
                            .to(SessionProperties::Table, SessionProperties::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RlsPolicySessionProperties::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(RlsPolicyModels::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(RlsPolicies::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(UserSessionPropertyValues::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SessionProperties::Table).to_owned())
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
enum SessionProperties {
    Table,
    Id,
    ProjectId,
    Name,
    Type,
    Required,
    DefaultExpr,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserSessionPropertyValues {
    Table,
    Id,
    UserId,
    SessionPropertyId,
    Value,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RlsPolicies {
    Table,
    Id,
    ProjectId,
    Name,
    Condition,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RlsPolicyModels {
    Table,
    Id,
    RlsPolicyId,
    ModelId,
}

#[derive(DeriveIden)]
enum RlsPolicySessionProperties {
    Table,
    Id,
    RlsPolicyId,
    SessionPropertyId,
}

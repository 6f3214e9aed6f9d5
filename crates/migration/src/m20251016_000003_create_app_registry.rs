//! Developers and the external applications they register.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Developer::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Developer::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Developer::Name).string().not_null())
                    .col(
                        ColumnDef::new(Developer::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Developer::Phone).string().null())
                    .col(
                        ColumnDef::new(Developer::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Developer::ApiQuota)
                            .integer()
                            .not_null()
                            .default(10000),
                    )
                    .col(
                        ColumnDef::new(Developer::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Developer::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExternalApp::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExternalApp::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExternalApp::Name).string().not_null())
                    .col(
                        ColumnDef::new(ExternalApp::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ExternalApp::DeveloperId).string().not_null())
                    .col(
                        ColumnDef::new(ExternalApp::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(ExternalApp::CallbackUrl).string().not_null())
                    .col(
                        ColumnDef::new(ExternalApp::Scopes)
                            .string()
                            .not_null()
                            .default("openid profile"),
                    )
                    .col(
                        ColumnDef::new(ExternalApp::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalApp::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalApp::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_external_app_developer_id")
                    .table(ExternalApp::Table)
                    .col(ExternalApp::DeveloperId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_external_app_developer_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ExternalApp::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Developer::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Developer {
    Table,
    Id,
    Name,
    Email,
    Phone,
    Status,
    ApiQuota,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ExternalApp {
    Table,
    Id,
    Name,
    Description,
    DeveloperId,
    Status,
    CallbackUrl,
    Scopes,
    CreatedAt,
    UpdatedAt,
    RevokedAt,
}

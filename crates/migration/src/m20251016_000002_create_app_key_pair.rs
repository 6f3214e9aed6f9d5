//! Creates the table holding RSA key pairs issued to external applications.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AppKeyPair::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AppKeyPair::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AppKeyPair::AppId).string().not_null())
                    .col(
                        ColumnDef::new(AppKeyPair::KeyId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AppKeyPair::PrivateKey).text().not_null())
                    .col(ColumnDef::new(AppKeyPair::PublicKey).text().not_null())
                    .col(
                        ColumnDef::new(AppKeyPair::Algorithm)
                            .string()
                            .not_null()
                            .default("RS256"),
                    )
                    .col(
                        ColumnDef::new(AppKeyPair::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(AppKeyPair::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AppKeyPair::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AppKeyPair::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AppKeyPair::LastUsedAt)
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
                    .name("idx_app_key_pair_app_id")
                    .table(AppKeyPair::Table)
                    .col(AppKeyPair::AppId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_app_key_pair_app_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AppKeyPair::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum AppKeyPair {
    Table,
    Id,
    AppId,
    KeyId,
    PrivateKey,
    PublicKey,
    Algorithm,
    Status,
    ExpiresAt,
    CreatedAt,
    RevokedAt,
    LastUsedAt,
}

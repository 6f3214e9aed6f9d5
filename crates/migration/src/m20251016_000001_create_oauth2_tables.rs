//! Creates the OAuth2 protocol tables.
//!
//! - oauth2_client: registered client applications
//! - oauth2_user: end users (identified by phone number)
//! - oauth2_authorization: single-use authorization codes
//! - oauth2_refresh_token: opaque refresh tokens

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Oauth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Oauth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Oauth2Client::Secret).string().not_null())
                    .col(ColumnDef::new(Oauth2Client::Name).string().not_null())
                    .col(ColumnDef::new(Oauth2Client::RedirectUris).text().not_null())
                    .col(
                        ColumnDef::new(Oauth2Client::GrantTypes)
                            .text()
                            .not_null()
                            .default("authorization_code refresh_token"),
                    )
                    .col(
                        ColumnDef::new(Oauth2Client::ResponseTypes)
                            .text()
                            .not_null()
                            .default("code"),
                    )
                    .col(
                        ColumnDef::new(Oauth2Client::Scope)
                            .text()
                            .not_null()
                            .default("openid profile"),
                    )
                    .col(
                        ColumnDef::new(Oauth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Oauth2User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Oauth2User::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Oauth2User::Phone)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Oauth2User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Oauth2User::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Short-lived, deleted on redemption or when found expired
        manager
            .create_table(
                Table::create()
                    .table(Oauth2Authorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Oauth2Authorization::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Oauth2Authorization::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Oauth2Authorization::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Oauth2Authorization::RedirectUri)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Oauth2Authorization::Scope).text().not_null())
                    .col(
                        ColumnDef::new(Oauth2Authorization::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Oauth2Authorization::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Oauth2RefreshToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Oauth2RefreshToken::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Oauth2RefreshToken::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Oauth2RefreshToken::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Oauth2RefreshToken::Scope).text().not_null())
                    .col(
                        ColumnDef::new(Oauth2RefreshToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Oauth2RefreshToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_authorization_client_id")
                    .table(Oauth2Authorization::Table)
                    .col(Oauth2Authorization::ClientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_refresh_token_user_id")
                    .table(Oauth2RefreshToken::Table)
                    .col(Oauth2RefreshToken::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_refresh_token_user_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_authorization_client_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Oauth2RefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Oauth2Authorization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Oauth2User::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Oauth2Client::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Oauth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    Secret,
    Name,
    RedirectUris,
    GrantTypes,
    ResponseTypes,
    Scope,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Oauth2User {
    #[sea_orm(iden = "oauth2_user")]
    Table,
    Id,
    Phone,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Oauth2Authorization {
    #[sea_orm(iden = "oauth2_authorization")]
    Table,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    Scope,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Oauth2RefreshToken {
    #[sea_orm(iden = "oauth2_refresh_token")]
    Table,
    Token,
    ClientId,
    UserId,
    Scope,
    ExpiresAt,
    CreatedAt,
}

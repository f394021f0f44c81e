//! Migration to create the platform_connections table.
//!
//! One row per (user, platform) OAuth grant. Tokens are stored as AES-GCM
//! ciphertexts; the composite unique index backs the atomic upsert.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlatformConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlatformConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlatformConnections::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(PlatformConnections::Platform)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformConnections::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformConnections::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformConnections::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PlatformConnections::AccountId).text().null())
                    .col(
                        ColumnDef::new(PlatformConnections::AccountName)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformConnections::Metadata)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PlatformConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_platform_connections_user_id")
                            .from(PlatformConnections::Table, PlatformConnections::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one connection per (user_id, platform)
        manager
            .create_index(
                Index::create()
                    .name("idx_platform_connections_user_platform")
                    .table(PlatformConnections::Table)
                    .col(PlatformConnections::UserId)
                    .col(PlatformConnections::Platform)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Background refresh scans by expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_platform_connections_expires_at")
                    .table(PlatformConnections::Table)
                    .col(PlatformConnections::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_platform_connections_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_platform_connections_user_platform")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PlatformConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PlatformConnections {
    Table,
    Id,
    UserId,
    Platform,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    AccountId,
    AccountName,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

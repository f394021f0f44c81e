//! Migration to create the oauth_states table.
//!
//! Holds pending authorizations between redirect and callback. Rows are keyed
//! by (user_id, platform) so a fresh authorization replaces a stale one, and
//! are deleted when the callback consumes them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthStates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthStates::UserId).uuid().not_null())
                    .col(ColumnDef::new(OAuthStates::Platform).string().not_null())
                    .col(ColumnDef::new(OAuthStates::State).string().not_null())
                    .col(ColumnDef::new(OAuthStates::CodeVerifier).string().null())
                    .col(
                        ColumnDef::new(OAuthStates::ClientPkce)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthStates::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthStates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_user_platform")
                    .table(OAuthStates::Table)
                    .col(OAuthStates::UserId)
                    .col(OAuthStates::Platform)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_expires_at")
                    .table(OAuthStates::Table)
                    .col(OAuthStates::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_oauth_states_expires_at").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_states_user_platform")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(OAuthStates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthStates {
    #[sea_orm(iden = "oauth_states")]
    Table,
    Id,
    UserId,
    Platform,
    State,
    CodeVerifier,
    ClientPkce,
    ExpiresAt,
    CreatedAt,
}

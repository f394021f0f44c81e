//! Migration to create the campaign_metrics table.
//!
//! Normalized per-campaign, per-day rows. No unique key:
//! ingestion appends, and the sync path replaces whole windows instead.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CampaignMetrics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignMetrics::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CampaignMetrics::UserId).uuid().not_null())
                    .col(ColumnDef::new(CampaignMetrics::Platform).text().not_null())
                    .col(
                        ColumnDef::new(CampaignMetrics::PlatformConnectionId)
                            .uuid()
                            .null(),
                    )
                    .col(ColumnDef::new(CampaignMetrics::CampaignId).text().not_null())
                    .col(
                        ColumnDef::new(CampaignMetrics::CampaignName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CampaignMetrics::Date).date().not_null())
                    .col(ColumnDef::new(CampaignMetrics::Spend).double().null())
                    .col(ColumnDef::new(CampaignMetrics::Impressions).big_integer().null())
                    .col(ColumnDef::new(CampaignMetrics::Clicks).big_integer().null())
                    .col(ColumnDef::new(CampaignMetrics::Conversions).double().null())
                    .col(
                        ColumnDef::new(CampaignMetrics::CostPerConversion)
                            .double()
                            .null(),
                    )
                    .col(ColumnDef::new(CampaignMetrics::ConversionRate).double().null())
                    .col(ColumnDef::new(CampaignMetrics::Ctr).double().null())
                    .col(ColumnDef::new(CampaignMetrics::Cpc).double().null())
                    .col(ColumnDef::new(CampaignMetrics::Roas).double().null())
                    .col(ColumnDef::new(CampaignMetrics::ConversionValue).double().null())
                    .col(
                        ColumnDef::new(CampaignMetrics::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_metrics_user_id")
                            .from(CampaignMetrics::Table, CampaignMetrics::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    // Historical rows survive disconnection
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_metrics_platform_connection_id")
                            .from(
                                CampaignMetrics::Table,
                                CampaignMetrics::PlatformConnectionId,
                            )
                            .to(PlatformConnections::Table, PlatformConnections::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_metrics_user_date")
                    .table(CampaignMetrics::Table)
                    .col(CampaignMetrics::UserId)
                    .col(CampaignMetrics::Date)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_metrics_user_platform_date")
                    .table(CampaignMetrics::Table)
                    .col(CampaignMetrics::UserId)
                    .col(CampaignMetrics::Platform)
                    .col(CampaignMetrics::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_campaign_metrics_user_platform_date")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_campaign_metrics_user_date").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(CampaignMetrics::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CampaignMetrics {
    Table,
    Id,
    UserId,
    Platform,
    PlatformConnectionId,
    CampaignId,
    CampaignName,
    Date,
    Spend,
    Impressions,
    Clicks,
    Conversions,
    CostPerConversion,
    ConversionRate,
    Ctr,
    Cpc,
    Roas,
    ConversionValue,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum PlatformConnections {
    Table,
    Id,
}

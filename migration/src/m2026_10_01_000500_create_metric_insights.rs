//! Migration to create the metric_insights table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MetricInsights::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MetricInsights::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MetricInsights::UserId).uuid().not_null())
                    .col(ColumnDef::new(MetricInsights::InsightType).text().not_null())
                    .col(ColumnDef::new(MetricInsights::Title).text().not_null())
                    .col(ColumnDef::new(MetricInsights::Message).text().not_null())
                    .col(
                        ColumnDef::new(MetricInsights::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_metric_insights_user_id")
                            .from(MetricInsights::Table, MetricInsights::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_metric_insights_user_created")
                    .table(MetricInsights::Table)
                    .col(MetricInsights::UserId)
                    .col(MetricInsights::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_metric_insights_user_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(MetricInsights::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MetricInsights {
    Table,
    Id,
    UserId,
    InsightType,
    Title,
    Message,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

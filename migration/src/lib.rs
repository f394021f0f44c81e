//! Database migrations for the CampaignIQ API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_10_01_000100_create_users;
mod m2026_10_01_000200_create_platform_connections;
mod m2026_10_01_000300_create_campaign_metrics;
mod m2026_10_01_000400_create_oauth_states;
mod m2026_10_01_000500_create_metric_insights;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_01_000100_create_users::Migration),
            Box::new(m2026_10_01_000200_create_platform_connections::Migration),
            Box::new(m2026_10_01_000300_create_campaign_metrics::Migration),
            Box::new(m2026_10_01_000400_create_oauth_states::Migration),
            Box::new(m2026_10_01_000500_create_metric_insights::Migration),
        ]
    }
}

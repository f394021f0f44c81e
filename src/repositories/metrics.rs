//! Campaign metrics repository (the metrics store)
//!
//! Rows are append-only. `append_metrics` never deduplicates; the sync path
//! uses [`MetricsRepository::replace_window`] so a re-fetch swaps a window of
//! rows instead of double counting it.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::date_range::DateRange;
use crate::models::campaign_metric::{self, Entity as CampaignMetric};
use crate::platform::Platform;

/// Rows per INSERT statement. Each row binds 18 parameters; SQLite caps a
/// statement at 32766 and Postgres at 65535.
pub const INSERT_CHUNK_ROWS: usize = 500;

/// A normalized metric row ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaignMetric {
    pub user_id: Uuid,
    pub platform: Platform,
    pub platform_connection_id: Option<Uuid>,
    pub campaign_id: String,
    pub campaign_name: String,
    pub date: NaiveDate,
    pub spend: Option<f64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub conversions: Option<f64>,
    pub cost_per_conversion: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub roas: Option<f64>,
    pub conversion_value: Option<f64>,
}

impl NewCampaignMetric {
    /// A row with every measure unreported.
    pub fn new(
        user_id: Uuid,
        platform: Platform,
        campaign_id: impl Into<String>,
        campaign_name: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id,
            platform,
            platform_connection_id: None,
            campaign_id: campaign_id.into(),
            campaign_name: campaign_name.into(),
            date,
            spend: None,
            impressions: None,
            clicks: None,
            conversions: None,
            cost_per_conversion: None,
            conversion_rate: None,
            ctr: None,
            cpc: None,
            roas: None,
            conversion_value: None,
        }
    }

    fn into_active_model(self) -> campaign_metric::ActiveModel {
        campaign_metric::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            platform: Set(self.platform.as_str().to_string()),
            platform_connection_id: Set(self.platform_connection_id),
            campaign_id: Set(self.campaign_id),
            campaign_name: Set(self.campaign_name),
            date: Set(self.date),
            spend: Set(self.spend),
            impressions: Set(self.impressions),
            clicks: Set(self.clicks),
            conversions: Set(self.conversions),
            cost_per_conversion: Set(self.cost_per_conversion),
            conversion_rate: Set(self.conversion_rate),
            ctr: Set(self.ctr),
            cpc: Set(self.cpc),
            roas: Set(self.roas),
            conversion_value: Set(self.conversion_value),
            created_at: Set(Utc::now().into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsRepository {
    db: Arc<DatabaseConnection>,
}

impl MetricsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Bulk-inserts rows as given
    pub async fn append_metrics(&self, rows: Vec<NewCampaignMetric>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin().await?;
        let count = insert_chunked(&txn, rows).await?;
        txn.commit().await?;
        Ok(count)
    }

    /// Rows for a user whose `date` falls inside `range` (both ends inclusive)
    pub async fn query_metrics(
        &self,
        user_id: Uuid,
        range: DateRange,
        platform: Option<Platform>,
    ) -> Result<Vec<campaign_metric::Model>> {
        let mut query = CampaignMetric::find()
            .filter(campaign_metric::Column::UserId.eq(user_id))
            .filter(campaign_metric::Column::Date.gte(range.start))
            .filter(campaign_metric::Column::Date.lte(range.end));

        if let Some(platform) = platform {
            query = query.filter(campaign_metric::Column::Platform.eq(platform.as_str()));
        }

        Ok(query
            .order_by_asc(campaign_metric::Column::Date)
            .order_by_asc(campaign_metric::Column::Platform)
            .order_by_asc(campaign_metric::Column::CampaignId)
            .all(&*self.db)
            .await?)
    }

    /// Atomically replaces every row of `(user, platform)` inside `range` with `rows`.
    ///
    /// Returns `(deleted, inserted)`.
    pub async fn replace_window(
        &self,
        user_id: Uuid,
        platform: Platform,
        range: DateRange,
        rows: Vec<NewCampaignMetric>,
    ) -> Result<(u64, u64)> {
        let txn = self.db.begin().await?;

        let deleted = CampaignMetric::delete_many()
            .filter(campaign_metric::Column::UserId.eq(user_id))
            .filter(campaign_metric::Column::Platform.eq(platform.as_str()))
            .filter(campaign_metric::Column::Date.gte(range.start))
            .filter(campaign_metric::Column::Date.lte(range.end))
            .exec(&txn)
            .await?
            .rows_affected;

        let inserted = insert_chunked(&txn, rows).await?;

        txn.commit().await?;
        Ok((deleted, inserted))
    }
}

async fn insert_chunked<C: ConnectionTrait>(conn: &C, rows: Vec<NewCampaignMetric>) -> Result<u64> {
    let count = rows.len() as u64;
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let chunk: Vec<_> = rows
            .by_ref()
            .take(INSERT_CHUNK_ROWS)
            .map(NewCampaignMetric::into_active_model)
            .collect();
        CampaignMetric::insert_many(chunk)
            .exec_without_returning(conn)
            .await?;
    }
    Ok(count)
}

//! Metrics ingestion
//!
//! Pulls per-campaign daily rows from each connected platform and stores them
//! with window replacement: the fetched window for a platform is deleted and
//! rewritten in one transaction, so re-running a sync never double counts.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::{AdPlatformMetrics, AdapterRegistry};
use crate::date_range::DateRange;
use crate::error::{AppError, AppResult};
use crate::platform::Platform;
use crate::repositories::{ConnectionRepository, MetricsRepository, NewCampaignMetric};
use crate::token_refresh::TokenRefreshService;

/// Result of syncing one platform
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSyncOutcome {
    pub platform: Platform,
    pub rows_deleted: u64,
    pub rows_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlatformSyncOutcome {
    fn failed(platform: Platform, error: &AppError) -> Self {
        Self {
            platform,
            rows_deleted: 0,
            rows_written: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
pub struct MetricsSyncService {
    connections: Arc<ConnectionRepository>,
    metrics: MetricsRepository,
    registry: Arc<AdapterRegistry>,
    token_refresh: TokenRefreshService,
}

impl MetricsSyncService {
    pub fn new(
        connections: Arc<ConnectionRepository>,
        metrics: MetricsRepository,
        registry: Arc<AdapterRegistry>,
        token_refresh: TokenRefreshService,
    ) -> Self {
        Self {
            connections,
            metrics,
            registry,
            token_refresh,
        }
    }

    /// Sync every connection of `user_id` (or only `platform`) for `range`.
    ///
    /// A failing platform is reported in its outcome and does not stop the rest.
    #[instrument(skip_all, fields(%user_id, ?platform, %range))]
    pub async fn sync_user(
        &self,
        user_id: Uuid,
        platform: Option<Platform>,
        range: DateRange,
    ) -> AppResult<Vec<PlatformSyncOutcome>> {
        let connections = self.connections.list_connections(user_id).await?;
        let mut outcomes = Vec::new();

        for connection in connections {
            let Ok(connected) = connection.platform.parse::<Platform>() else {
                warn!(platform = %connection.platform, "Skipping connection with unknown platform");
                continue;
            };
            if platform.is_some_and(|wanted| wanted != connected) {
                continue;
            }

            let outcome = match self.sync_platform(user_id, connected, connection.id, range).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(platform = %connected, error = %err, "Platform sync failed");
                    counter!("metrics_sync_failures_total", "platform" => connected.as_str())
                        .increment(1);
                    PlatformSyncOutcome::failed(connected, &err)
                }
            };
            outcomes.push(outcome);
        }

        info!(
            platforms = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.is_success()).count(),
            %range,
            "Metrics sync finished"
        );
        Ok(outcomes)
    }

    async fn sync_platform(
        &self,
        user_id: Uuid,
        platform: Platform,
        connection_id: Uuid,
        range: DateRange,
    ) -> AppResult<PlatformSyncOutcome> {
        let adapter = self.registry.get(platform)?;
        let access = self.token_refresh.ensure_fresh(user_id, platform).await?;
        let records = adapter.fetch_campaign_metrics(&access, range).await?;

        let fetched = records.len();
        let rows: Vec<NewCampaignMetric> = records
            .into_iter()
            .filter(|record| range.contains(record.date))
            .map(|record| to_metric_row(user_id, platform, connection_id, record))
            .collect();
        if rows.len() < fetched {
            warn!(
                %platform,
                dropped = fetched - rows.len(),
                "Platform returned rows outside the requested window"
            );
        }

        let (rows_deleted, rows_written) = self
            .metrics
            .replace_window(user_id, platform, range, rows)
            .await?;

        counter!("metrics_rows_written_total", "platform" => platform.as_str())
            .increment(rows_written);
        Ok(PlatformSyncOutcome {
            platform,
            rows_deleted,
            rows_written,
            error: None,
        })
    }
}

fn to_metric_row(
    user_id: Uuid,
    platform: Platform,
    connection_id: Uuid,
    record: AdPlatformMetrics,
) -> NewCampaignMetric {
    NewCampaignMetric {
        user_id,
        platform,
        platform_connection_id: Some(connection_id),
        campaign_id: record.campaign_id,
        campaign_name: record.campaign_name,
        date: record.date,
        spend: record.spend,
        impressions: record.impressions,
        clicks: record.clicks,
        conversions: record.conversions,
        cost_per_conversion: record.cost_per_conversion,
        conversion_rate: record.conversion_rate,
        ctr: record.ctr,
        cpc: record.cpc,
        roas: record.roas,
        conversion_value: record.conversion_value,
    }
}

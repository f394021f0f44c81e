//! # Aggregation Engine
//!
//! Read-only views computed on demand from stored campaign metric rows:
//! summary with period-over-period change, per-platform performance, spend
//! distribution, top campaigns, daily timeseries and insights.
//!
//! The view functions are pure over a row slice; [`AggregationEngine`] only
//! loads rows and connections and hands them over. Absence of data is never an
//! error: an empty window yields zeros.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::date_range::{DEFAULT_WINDOW_DAYS, DateRange};
use crate::error::{AppError, AppResult};
use crate::models::campaign_metric;
use crate::platform::Platform;
use crate::repositories::{ConnectionRepository, InsightRepository, MetricsRepository};

pub mod insights;
pub mod measures;
pub mod views;

#[cfg(test)]
mod tests;

use measures::{Totals, percent_change, safe_ratio, value_or};
pub use views::{
    InsightType, MetricInsight, MetricSummary, PerformanceTimeseriesPoint, PlatformPerformance,
    SpendDistribution, TimeseriesMetric, TopCampaign,
};

/// Default and maximum `limit` for top campaigns
pub const DEFAULT_TOP_CAMPAIGNS: u64 = 5;
pub const MAX_TOP_CAMPAIGNS: u64 = 100;

fn row_platform(row: &campaign_metric::Model) -> Option<Platform> {
    match row.platform.parse() {
        Ok(platform) => Some(platform),
        Err(_) => {
            warn!(platform = %row.platform, row_id = %row.id, "Ignoring metric row with unknown platform");
            None
        }
    }
}

/// Totals, averages and percent change against `previous`.
pub fn summarize(
    current: &[campaign_metric::Model],
    previous: &[campaign_metric::Model],
    value_per_conversion: f64,
) -> MetricSummary {
    let now = Totals::from_rows(current);
    let before = Totals::from_rows(previous);

    MetricSummary {
        total_spend: now.spend,
        total_impressions: now.impressions,
        total_clicks: now.clicks,
        total_conversions: now.conversions,
        average_ctr: now.ctr(),
        average_cpc: now.cpc(),
        average_cost_per_conversion: now.cost_per_conversion(),
        overall_roas: now.roas(value_per_conversion),
        spend_change: percent_change(now.spend, before.spend),
        roas_change: percent_change(
            now.roas(value_per_conversion),
            before.roas(value_per_conversion),
        ),
        conversions_change: percent_change(now.conversions, before.conversions),
        cost_per_conversion_change: percent_change(
            now.cost_per_conversion(),
            before.cost_per_conversion(),
        ),
    }
}

/// One entry per platform that has rows or a connection, in [`Platform::ALL`] order.
pub fn platform_performance(
    rows: &[campaign_metric::Model],
    connected: &[Platform],
    value_per_conversion: f64,
) -> Vec<PlatformPerformance> {
    let mut totals: HashMap<Platform, Totals> = HashMap::new();
    for row in rows {
        if let Some(platform) = row_platform(row) {
            totals.entry(platform).or_default().add(row);
        }
    }

    Platform::ALL
        .into_iter()
        .filter(|platform| totals.contains_key(platform) || connected.contains(platform))
        .map(|platform| {
            let t = totals.get(&platform).copied().unwrap_or_default();
            PlatformPerformance {
                platform,
                spend: t.spend,
                clicks: t.clicks,
                impressions: t.impressions,
                conversions: t.conversions,
                roas: t.roas(value_per_conversion),
                cpc: t.cpc(),
                ctr: t.ctr(),
                cost_per_conversion: t.cost_per_conversion(),
                is_connected: connected.contains(&platform),
            }
        })
        .collect()
}

/// Share of total spend per platform; all zero when nothing was spent.
pub fn spend_distribution(performance: &[PlatformPerformance]) -> Vec<SpendDistribution> {
    let total: f64 = performance.iter().map(|p| p.spend).sum();
    performance
        .iter()
        .map(|p| SpendDistribution {
            platform: p.platform,
            percentage: safe_ratio(p.spend, total) * 100.0,
            is_connected: p.is_connected,
        })
        .collect()
}

/// Campaigns grouped by (campaign id, platform), best ROAS first.
///
/// Ties on ROAS fall back to spend (descending), then campaign id and
/// platform (ascending) so the order is stable. The reported name is the one
/// on the campaign's most recent row.
pub fn top_campaigns(
    rows: &[campaign_metric::Model],
    limit: usize,
    value_per_conversion: f64,
) -> Vec<TopCampaign> {
    struct Group<'a> {
        name: &'a str,
        latest: NaiveDate,
        spend: f64,
        conversions: f64,
    }

    let mut groups: BTreeMap<(&str, Platform), Group<'_>> = BTreeMap::new();
    for row in rows {
        let Some(platform) = row_platform(row) else {
            continue;
        };
        let group = groups
            .entry((row.campaign_id.as_str(), platform))
            .or_insert(Group {
                name: &row.campaign_name,
                latest: row.date,
                spend: 0.0,
                conversions: 0.0,
            });
        if row.date >= group.latest {
            group.latest = row.date;
            group.name = &row.campaign_name;
        }
        group.spend += value_or(row.spend);
        group.conversions += value_or(row.conversions);
    }

    let mut campaigns: Vec<TopCampaign> = groups
        .into_iter()
        .map(|((campaign_id, platform), group)| TopCampaign {
            campaign_id: campaign_id.to_string(),
            campaign_name: group.name.to_string(),
            platform,
            spend: group.spend,
            conversions: group.conversions,
            roas: safe_ratio(group.conversions * value_per_conversion, group.spend),
        })
        .collect();

    campaigns.sort_by(|a, b| {
        b.roas
            .total_cmp(&a.roas)
            .then_with(|| b.spend.total_cmp(&a.spend))
            .then_with(|| a.campaign_id.cmp(&b.campaign_id))
            .then_with(|| a.platform.cmp(&b.platform))
    });
    campaigns.truncate(limit);
    campaigns
}

/// One point per day of `range`, zero-filled. Ratios are computed from the
/// day's sums, never by adding per-row ratios.
pub fn performance_timeseries(
    rows: &[campaign_metric::Model],
    range: DateRange,
    metric: TimeseriesMetric,
    platform: Option<Platform>,
    value_per_conversion: f64,
) -> Vec<PerformanceTimeseriesPoint> {
    let mut by_day: HashMap<NaiveDate, Totals> = HashMap::new();
    for row in rows {
        if !range.contains(row.date) {
            continue;
        }
        if let Some(filter) = platform
            && row.platform != filter.as_str()
        {
            continue;
        }
        by_day.entry(row.date).or_default().add(row);
    }

    range
        .iter_days()
        .map(|day| {
            let t = by_day.get(&day).copied().unwrap_or_default();
            let value = match metric {
                TimeseriesMetric::Spend => t.spend,
                TimeseriesMetric::Conversions => t.conversions,
                TimeseriesMetric::Ctr => t.ctr(),
                TimeseriesMetric::Roas => t.roas(value_per_conversion),
            };
            PerformanceTimeseriesPoint::new(day, platform, metric, value)
        })
        .collect()
}

/// Loads rows and connections and computes the views for a user.
#[derive(Clone)]
pub struct AggregationEngine {
    metrics: MetricsRepository,
    connections: Arc<ConnectionRepository>,
    insights: InsightRepository,
    value_per_conversion: f64,
}

impl AggregationEngine {
    pub fn new(
        metrics: MetricsRepository,
        connections: Arc<ConnectionRepository>,
        insights: InsightRepository,
        value_per_conversion: f64,
    ) -> Self {
        Self {
            metrics,
            connections,
            insights,
            value_per_conversion,
        }
    }

    async fn connected_platforms(&self, user_id: Uuid) -> AppResult<Vec<Platform>> {
        Ok(self
            .connections
            .list_connections(user_id)
            .await?
            .iter()
            .filter_map(|connection| connection.platform.parse().ok())
            .collect())
    }

    pub async fn get_metrics_summary(
        &self,
        user_id: Uuid,
        range: DateRange,
        platform: Option<Platform>,
    ) -> AppResult<MetricSummary> {
        let current = self.metrics.query_metrics(user_id, range, platform).await?;
        let previous = self
            .metrics
            .query_metrics(user_id, range.previous_period(), platform)
            .await?;
        debug!(
            current_rows = current.len(),
            previous_rows = previous.len(),
            "Computing metrics summary"
        );
        Ok(summarize(&current, &previous, self.value_per_conversion))
    }

    pub async fn get_platform_performance(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<PlatformPerformance>> {
        let rows = self.metrics.query_metrics(user_id, range, None).await?;
        let connected = self.connected_platforms(user_id).await?;
        Ok(platform_performance(&rows, &connected, self.value_per_conversion))
    }

    pub async fn get_spend_distribution(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<SpendDistribution>> {
        let performance = self.get_platform_performance(user_id, range).await?;
        Ok(spend_distribution(&performance))
    }

    pub async fn get_top_campaigns(
        &self,
        user_id: Uuid,
        range: DateRange,
        limit: u64,
        platform: Option<Platform>,
    ) -> AppResult<Vec<TopCampaign>> {
        if !(1..=MAX_TOP_CAMPAIGNS).contains(&limit) {
            return Err(AppError::validation(
                "limit",
                format!("limit must be between 1 and {MAX_TOP_CAMPAIGNS}"),
            ));
        }
        let rows = self.metrics.query_metrics(user_id, range, platform).await?;
        Ok(top_campaigns(&rows, limit as usize, self.value_per_conversion))
    }

    pub async fn get_performance_timeseries(
        &self,
        user_id: Uuid,
        range: DateRange,
        metric: TimeseriesMetric,
        platform: Option<Platform>,
    ) -> AppResult<Vec<PerformanceTimeseriesPoint>> {
        let rows = self.metrics.query_metrics(user_id, range, platform).await?;
        Ok(performance_timeseries(
            &rows,
            range,
            metric,
            platform,
            self.value_per_conversion,
        ))
    }

    /// Stored and derived insights, newest first, at most five.
    ///
    /// Derived insights compare the 30 days ending `today` with the 30 before.
    pub async fn get_metric_insights(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> AppResult<Vec<MetricInsight>> {
        let current_range = DateRange::last_days(today, DEFAULT_WINDOW_DAYS);
        let previous_range = current_range.previous_period();
        let rows = self
            .metrics
            .query_metrics(
                user_id,
                DateRange {
                    start: previous_range.start,
                    end: current_range.end,
                },
                None,
            )
            .await?;

        let (current, previous): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|row| current_range.contains(row.date));

        let connected = self.connected_platforms(user_id).await?;
        let connected_without_data: Vec<Platform> = connected
            .into_iter()
            .filter(|platform| !current.iter().any(|row| row.platform == platform.as_str()))
            .collect();

        let mut all = insights::derive_insights(
            &Totals::from_rows(&current),
            &Totals::from_rows(&previous),
            self.value_per_conversion,
            &connected_without_data,
            Utc::now(),
        );

        let stored = self
            .insights
            .list_recent(user_id, insights::MAX_INSIGHTS as u64)
            .await?;
        all.extend(stored.into_iter().filter_map(|model| {
            match model.insight_type.parse::<InsightType>() {
                Ok(insight_type) => Some(MetricInsight {
                    insight_type,
                    title: model.title,
                    message: model.message,
                    timestamp: model.created_at.with_timezone(&Utc),
                }),
                Err(_) => {
                    warn!(insight_id = %model.id, "Skipping stored insight with unknown type");
                    None
                }
            }
        }));

        Ok(insights::merge_newest_first(all))
    }
}

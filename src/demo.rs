//! Demo content provider
//!
//! Writes clearly labeled sample campaigns (ids prefixed `demo-`) and sample
//! insights for a user so a first run has something to show. Only the
//! `seed-demo` command calls this; the aggregation engine never does.

use chrono::{Days, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::aggregation::InsightType;
use crate::date_range::DateRange;
use crate::error::AppResult;
use crate::platform::Platform;
use crate::repositories::{InsightRepository, MetricsRepository, NewCampaignMetric};

pub const DEMO_CAMPAIGN_PREFIX: &str = "demo-";

struct SampleCampaign {
    name: &'static str,
    platform: Platform,
    /// Spend over the whole seeded window
    spend: f64,
    roas: f64,
}

const SAMPLE_CAMPAIGNS: [SampleCampaign; 5] = [
    SampleCampaign {
        name: "Summer Collection",
        platform: Platform::GoogleAds,
        spend: 4321.56,
        roas: 4.2,
    },
    SampleCampaign {
        name: "New Product Launch",
        platform: Platform::FacebookAds,
        spend: 3785.23,
        roas: 3.8,
    },
    SampleCampaign {
        name: "Seasonal Promotion",
        platform: Platform::InstagramAds,
        spend: 2543.78,
        roas: 3.5,
    },
    SampleCampaign {
        name: "Holiday Special",
        platform: Platform::GoogleAds,
        spend: 1987.45,
        roas: 2.8,
    },
    SampleCampaign {
        name: "Brand Awareness",
        platform: Platform::TiktokAds,
        spend: 1453.21,
        roas: 1.9,
    },
];

const SAMPLE_INSIGHTS: [(InsightType, &str, &str); 2] = [
    (
        InsightType::Improvement,
        "Welcome to CampaignIQ",
        "This account holds sample data. Connect your ad platforms to see your own performance.",
    ),
    (
        InsightType::Recommendation,
        "Getting Started",
        "Connect your Google, Meta or TikTok ad accounts, then fetch data to replace the samples.",
    ),
];

/// What a seeding run wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoSeedReport {
    pub metric_rows: u64,
    pub insights: u64,
}

/// Daily rows for every sample campaign over the `days` days ending `today`.
///
/// Values vary from day to day but are deterministic, and each campaign's
/// ROAS matches its sample under `value_per_conversion`.
pub fn demo_rows(
    user_id: Uuid,
    today: NaiveDate,
    days: u64,
    value_per_conversion: f64,
) -> Vec<NewCampaignMetric> {
    let days = days.max(1);
    let mut rows = Vec::new();

    for (index, sample) in SAMPLE_CAMPAIGNS.iter().enumerate() {
        let daily_spend = sample.spend / days as f64;
        for offset in 0..days {
            let Some(date) = today.checked_sub_days(Days::new(offset)) else {
                break;
            };
            let wobble = 0.8 + 0.4 * (((offset as usize * 7 + index * 3) % 10) as f64 / 10.0);
            let spend = (daily_spend * wobble * 100.0).round() / 100.0;
            let impressions = (spend * 120.0).round() as i64;
            let clicks = (impressions as f64 * 0.035).round() as i64;
            let conversions = spend * sample.roas / value_per_conversion;

            let mut row = NewCampaignMetric::new(
                user_id,
                sample.platform,
                format!("{DEMO_CAMPAIGN_PREFIX}{}", index + 1),
                sample.name,
                date,
            );
            row.spend = Some(spend);
            row.impressions = Some(impressions);
            row.clicks = Some(clicks);
            row.conversions = Some(conversions);
            rows.push(row);
        }
    }
    rows
}

pub struct DemoContentProvider {
    metrics: MetricsRepository,
    insights: InsightRepository,
    value_per_conversion: f64,
}

impl DemoContentProvider {
    pub fn new(metrics: MetricsRepository, insights: InsightRepository, value_per_conversion: f64) -> Self {
        Self {
            metrics,
            insights,
            value_per_conversion,
        }
    }

    /// Seed sample rows and insights. Does nothing when demo rows already
    /// exist in the window.
    pub async fn seed_user(&self, user_id: Uuid, today: NaiveDate, days: u64) -> AppResult<DemoSeedReport> {
        let window = DateRange::last_days(today, days.saturating_sub(1));
        let existing = self.metrics.query_metrics(user_id, window, None).await?;
        if existing
            .iter()
            .any(|row| row.campaign_id.starts_with(DEMO_CAMPAIGN_PREFIX))
        {
            info!(%user_id, "Demo content already present");
            return Ok(DemoSeedReport::default());
        }

        let metric_rows = self
            .metrics
            .append_metrics(demo_rows(user_id, today, days, self.value_per_conversion))
            .await?;

        let now = Utc::now();
        for (offset, (insight_type, title, message)) in SAMPLE_INSIGHTS.iter().enumerate() {
            self.insights
                .create(
                    user_id,
                    insight_type.as_str(),
                    title,
                    message,
                    now - chrono::Duration::minutes(3 * offset as i64),
                )
                .await?;
        }

        let report = DemoSeedReport {
            metric_rows,
            insights: SAMPLE_INSIGHTS.len() as u64,
        };
        info!(%user_id, ?report, "Seeded demo content");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_labeled_and_cover_the_window() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let rows = demo_rows(Uuid::nil(), today, 30, 100.0);

        assert_eq!(rows.len(), SAMPLE_CAMPAIGNS.len() * 30);
        assert!(rows.iter().all(|r| r.campaign_id.starts_with(DEMO_CAMPAIGN_PREFIX)));
        assert!(rows.iter().all(|r| r.date <= today));
        assert_eq!(
            rows.iter().map(|r| r.date).min(),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
    }

    #[test]
    fn each_campaign_keeps_its_sample_roas() {
        let rows = demo_rows(Uuid::nil(), NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(), 14, 100.0);
        let first: Vec<_> = rows.iter().filter(|r| r.campaign_id == "demo-1").collect();
        let spend: f64 = first.iter().filter_map(|r| r.spend).sum();
        let conversions: f64 = first.iter().filter_map(|r| r.conversions).sum();

        assert!((conversions * 100.0 / spend - 4.2).abs() < 1e-9);
    }
}

//! Read-side view types returned by the aggregation engine.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::platform::Platform;

/// Totals and averages over a window, with changes against the previous window
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub total_spend: f64,
    pub total_impressions: i64,
    pub total_clicks: i64,
    pub total_conversions: f64,
    /// Clicks / impressions (fraction)
    pub average_ctr: f64,
    pub average_cpc: f64,
    pub average_cost_per_conversion: f64,
    pub overall_roas: f64,
    /// Percent change against the previous period of equal length
    pub spend_change: f64,
    pub roas_change: f64,
    pub conversions_change: f64,
    pub cost_per_conversion_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformPerformance {
    pub platform: Platform,
    pub spend: f64,
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: f64,
    pub roas: f64,
    pub cpc: f64,
    pub ctr: f64,
    pub cost_per_conversion: f64,
    pub is_connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpendDistribution {
    pub platform: Platform,
    /// Share of total spend, 0..=100
    pub percentage: f64,
    pub is_connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopCampaign {
    pub campaign_id: String,
    pub campaign_name: String,
    pub platform: Platform,
    pub spend: f64,
    pub conversions: f64,
    pub roas: f64,
}

/// One day of a chart series. Only the requested metric is set.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTimeseriesPoint {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roas: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversions: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctr: Option<f64>,
}

impl PerformanceTimeseriesPoint {
    pub fn new(
        date: NaiveDate,
        platform: Option<Platform>,
        metric: TimeseriesMetric,
        value: f64,
    ) -> Self {
        let mut point = Self {
            date,
            platform,
            spend: None,
            roas: None,
            conversions: None,
            ctr: None,
        };
        match metric {
            TimeseriesMetric::Spend => point.spend = Some(value),
            TimeseriesMetric::Roas => point.roas = Some(value),
            TimeseriesMetric::Conversions => point.conversions = Some(value),
            TimeseriesMetric::Ctr => point.ctr = Some(value),
        }
        point
    }

    /// The value of whichever metric the point carries.
    pub fn value(&self) -> f64 {
        self.spend
            .or(self.roas)
            .or(self.conversions)
            .or(self.ctr)
            .unwrap_or_default()
    }
}

/// Metric plotted by the performance endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeseriesMetric {
    #[default]
    Spend,
    Roas,
    Conversions,
    Ctr,
}

impl FromStr for TimeseriesMetric {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "spend" => Ok(Self::Spend),
            "roas" => Ok(Self::Roas),
            "conversions" => Ok(Self::Conversions),
            "ctr" => Ok(Self::Ctr),
            other => Err(AppError::validation(
                "metric",
                format!("'{other}' is not one of spend, roas, conversions, ctr"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Improvement,
    Warning,
    Alert,
    Recommendation,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::Improvement => "improvement",
            InsightType::Warning => "warning",
            InsightType::Alert => "alert",
            InsightType::Recommendation => "recommendation",
        }
    }
}

impl FromStr for InsightType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "improvement" => Ok(Self::Improvement),
            "warning" => Ok(Self::Warning),
            "alert" => Ok(Self::Alert),
            "recommendation" => Ok(Self::Recommendation),
            other => Err(AppError::validation("type", format!("unknown insight type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MetricInsight {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

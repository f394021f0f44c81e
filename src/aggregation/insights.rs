//! Insights derived from a user's own numbers.
//!
//! Nothing here invents data: with no rows in either window the only output
//! is a recommendation per connected platform that has not reported yet.

use chrono::{DateTime, Utc};

use super::measures::{Totals, percent_change};
use super::views::{InsightType, MetricInsight};
use crate::platform::Platform;

/// Most insights returned by the insights view.
pub const MAX_INSIGHTS: usize = 5;

const ROAS_IMPROVEMENT_PCT: f64 = 10.0;
const COST_PER_CONVERSION_WARNING_PCT: f64 = 10.0;
const SPEND_ALERT_PCT: f64 = 50.0;

pub fn derive_insights(
    current: &Totals,
    previous: &Totals,
    value_per_conversion: f64,
    connected_without_data: &[Platform],
    now: DateTime<Utc>,
) -> Vec<MetricInsight> {
    let mut insights = Vec::new();
    let insight = |insight_type, title: &str, message: String| MetricInsight {
        insight_type,
        title: title.to_string(),
        message,
        timestamp: now,
    };

    let roas_change = percent_change(
        current.roas(value_per_conversion),
        previous.roas(value_per_conversion),
    );
    if roas_change >= ROAS_IMPROVEMENT_PCT {
        insights.push(insight(
            InsightType::Improvement,
            "ROAS improved",
            format!(
                "Return on ad spend rose {:.1}% to {:.2} compared with the previous period.",
                roas_change,
                current.roas(value_per_conversion)
            ),
        ));
    }

    let cpa_change = percent_change(current.cost_per_conversion(), previous.cost_per_conversion());
    if cpa_change >= COST_PER_CONVERSION_WARNING_PCT {
        insights.push(insight(
            InsightType::Warning,
            "Cost per conversion rising",
            format!(
                "Cost per conversion increased {:.1}% to {:.2}.",
                cpa_change,
                current.cost_per_conversion()
            ),
        ));
    }

    let spend_change = percent_change(current.spend, previous.spend);
    if spend_change >= SPEND_ALERT_PCT {
        insights.push(insight(
            InsightType::Alert,
            "Spend spike",
            format!(
                "Spend is up {:.1}% ({:.2} vs {:.2}) on the previous period.",
                spend_change, current.spend, previous.spend
            ),
        ));
    }

    for platform in connected_without_data {
        insights.push(insight(
            InsightType::Recommendation,
            "Sync your data",
            format!(
                "{} is connected but has no metrics for this period yet. Fetch data to include it.",
                platform.display_name()
            ),
        ));
    }

    insights
}

/// Merge insight lists newest first and keep the first [`MAX_INSIGHTS`].
pub fn merge_newest_first(mut insights: Vec<MetricInsight>) -> Vec<MetricInsight> {
    insights.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    insights.truncate(MAX_INSIGHTS);
    insights
}

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use super::measures::Totals;
use super::*;

const VALUE_PER_CONVERSION: f64 = 100.0;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn row(platform: Platform, campaign: &str, day: u32, spend: f64, conversions: f64) -> campaign_metric::Model {
    campaign_metric::Model {
        id: Uuid::new_v4(),
        user_id: Uuid::nil(),
        platform: platform.as_str().to_string(),
        platform_connection_id: None,
        campaign_id: campaign.to_string(),
        campaign_name: format!("Campaign {campaign}"),
        date: date(day),
        spend: Some(spend),
        impressions: Some(1000),
        clicks: Some(50),
        conversions: Some(conversions),
        cost_per_conversion: None,
        conversion_rate: None,
        ctr: None,
        cpc: None,
        roas: None,
        conversion_value: None,
        created_at: Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap().into(),
    }
}

#[test]
fn empty_summary_is_all_zero() {
    let summary = summarize(&[], &[], VALUE_PER_CONVERSION);
    assert_eq!(summary, MetricSummary::default());
    assert!(!summary.overall_roas.is_nan());
}

#[test]
fn summary_roas_uses_assumed_conversion_value() {
    let rows = vec![row(Platform::GoogleAds, "1", 10, 100.0, 2.0)];
    let summary = summarize(&rows, &[], VALUE_PER_CONVERSION);

    assert_eq!(summary.overall_roas, 2.0);
    assert_eq!(summary.average_cost_per_conversion, 50.0);
    assert_eq!(summary.average_ctr, 0.05);
    assert_eq!(summary.average_cpc, 2.0);
    // No previous data means no change rather than infinity
    assert_eq!(summary.spend_change, 0.0);
}

#[test]
fn summary_reports_change_against_previous_period() {
    let current = vec![row(Platform::GoogleAds, "1", 10, 150.0, 3.0)];
    let previous = vec![row(Platform::GoogleAds, "1", 2, 100.0, 4.0)];
    let summary = summarize(&current, &previous, VALUE_PER_CONVERSION);

    assert_eq!(summary.spend_change, 50.0);
    assert_eq!(summary.conversions_change, -25.0);
    // cost per conversion 25 -> 50
    assert_eq!(summary.cost_per_conversion_change, 100.0);
}

#[test]
fn unreported_measures_sum_as_zero() {
    let mut sparse = row(Platform::TiktokAds, "9", 4, 0.0, 0.0);
    sparse.spend = None;
    sparse.conversions = None;
    sparse.impressions = None;
    sparse.clicks = None;

    assert_eq!(Totals::from_rows([&sparse]), Totals::default());
}

#[test]
fn platform_performance_includes_connected_platforms_without_rows() {
    let rows = vec![row(Platform::FacebookAds, "7", 3, 40.0, 1.0)];
    let performance = platform_performance(&rows, &[Platform::GoogleAds], VALUE_PER_CONVERSION);

    assert_eq!(performance.len(), 2);
    assert_eq!(performance[0].platform, Platform::GoogleAds);
    assert!(performance[0].is_connected);
    assert_eq!(performance[0].spend, 0.0);
    assert_eq!(performance[0].roas, 0.0);

    // Historical data survives a disconnect
    assert_eq!(performance[1].platform, Platform::FacebookAds);
    assert!(!performance[1].is_connected);
    assert_eq!(performance[1].roas, 2.5);
}

#[test]
fn spend_distribution_sums_to_one_hundred() {
    let rows = vec![
        row(Platform::GoogleAds, "1", 1, 30.0, 1.0),
        row(Platform::FacebookAds, "2", 1, 60.0, 1.0),
        row(Platform::TiktokAds, "3", 1, 10.0, 1.0),
    ];
    let distribution =
        spend_distribution(&platform_performance(&rows, &[], VALUE_PER_CONVERSION));

    let total: f64 = distribution.iter().map(|d| d.percentage).sum();
    assert!((total - 100.0).abs() < 1e-9);
    assert!((distribution[1].percentage - 60.0).abs() < 1e-9);
}

#[test]
fn spend_distribution_without_spend_is_all_zero() {
    let performance = platform_performance(
        &[],
        &[Platform::GoogleAds, Platform::TiktokAds],
        VALUE_PER_CONVERSION,
    );
    let distribution = spend_distribution(&performance);

    assert_eq!(distribution.len(), 2);
    assert!(distribution.iter().all(|d| d.percentage == 0.0));
}

#[test]
fn top_campaigns_rank_by_roas_and_truncate() {
    // ROAS 4.2, 1.9, 3.8
    let rows = vec![
        row(Platform::GoogleAds, "a", 1, 100.0, 4.2),
        row(Platform::FacebookAds, "b", 1, 100.0, 1.9),
        row(Platform::TiktokAds, "c", 1, 100.0, 3.8),
    ];
    let top = top_campaigns(&rows, 2, VALUE_PER_CONVERSION);

    let roas: Vec<f64> = top.iter().map(|c| (c.roas * 10.0).round() / 10.0).collect();
    assert_eq!(roas, vec![4.2, 3.8]);
    assert_eq!(top[0].campaign_id, "a");
    assert_eq!(top[1].campaign_id, "c");
}

#[test]
fn top_campaigns_group_by_campaign_and_platform() {
    let rows = vec![
        row(Platform::GoogleAds, "shared", 1, 50.0, 1.0),
        row(Platform::GoogleAds, "shared", 2, 50.0, 1.0),
        row(Platform::FacebookAds, "shared", 1, 10.0, 1.0),
    ];
    let top = top_campaigns(&rows, 10, VALUE_PER_CONVERSION);

    assert_eq!(top.len(), 2);
    let google = top.iter().find(|c| c.platform == Platform::GoogleAds).unwrap();
    assert_eq!(google.spend, 100.0);
    assert_eq!(google.conversions, 2.0);
    assert_eq!(google.roas, 2.0);
}

#[test]
fn top_campaign_ties_break_on_spend_then_id() {
    let rows = vec![
        row(Platform::GoogleAds, "small", 1, 50.0, 1.0),
        row(Platform::GoogleAds, "big", 1, 100.0, 2.0),
        row(Platform::GoogleAds, "also-big", 1, 100.0, 2.0),
    ];
    let ids: Vec<String> = top_campaigns(&rows, 5, VALUE_PER_CONVERSION)
        .into_iter()
        .map(|c| c.campaign_id)
        .collect();
    assert_eq!(ids, vec!["also-big", "big", "small"]);
}

#[test]
fn timeseries_has_one_point_per_day_even_without_rows() {
    let range = DateRange::new(date(1), date(7)).unwrap();
    let points = performance_timeseries(&[], range, TimeseriesMetric::Spend, None, VALUE_PER_CONVERSION);

    assert_eq!(points.len() as i64, range.span_days() + 1);
    assert!(points.windows(2).all(|w| w[0].date < w[1].date));
    assert!(points.iter().all(|p| p.spend == Some(0.0) && p.roas.is_none()));
}

#[test]
fn timeseries_ctr_is_ratio_of_daily_sums() {
    let mut high = row(Platform::GoogleAds, "1", 2, 10.0, 0.0);
    high.impressions = Some(100);
    high.clicks = Some(50);
    high.ctr = Some(0.5);
    let mut low = row(Platform::FacebookAds, "2", 2, 10.0, 0.0);
    low.impressions = Some(900);
    low.clicks = Some(10);
    low.ctr = Some(0.0111);

    let range = DateRange::new(date(1), date(3)).unwrap();
    let points = performance_timeseries(&[high, low], range, TimeseriesMetric::Ctr, None, VALUE_PER_CONVERSION);

    assert_eq!(points[0].ctr, Some(0.0));
    assert_eq!(points[1].ctr, Some(0.06));
    assert_eq!(points[2].ctr, Some(0.0));
}

#[test]
fn timeseries_platform_filter_is_echoed_on_points() {
    let rows = vec![
        row(Platform::GoogleAds, "1", 1, 10.0, 1.0),
        row(Platform::TiktokAds, "2", 1, 90.0, 1.0),
    ];
    let range = DateRange::day(date(1));
    let points = performance_timeseries(
        &rows,
        range,
        TimeseriesMetric::Spend,
        Some(Platform::GoogleAds),
        VALUE_PER_CONVERSION,
    );

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].platform, Some(Platform::GoogleAds));
    assert_eq!(points[0].value(), 10.0);
}

#[test]
fn derived_insights_flag_changes_and_idle_connections() {
    let current = Totals {
        spend: 300.0,
        impressions: 0,
        clicks: 0,
        conversions: 6.0,
    };
    let previous = Totals {
        spend: 100.0,
        impressions: 0,
        clicks: 0,
        conversions: 1.0,
    };
    let now = Utc::now();
    let derived = insights::derive_insights(&current, &previous, VALUE_PER_CONVERSION, &[Platform::TiktokAds], now);

    let kinds: Vec<InsightType> = derived.iter().map(|i| i.insight_type).collect();
    assert_eq!(
        kinds,
        vec![InsightType::Improvement, InsightType::Alert, InsightType::Recommendation]
    );
}

#[test]
fn derived_insights_never_invent_numbers_without_data() {
    let derived = insights::derive_insights(
        &Totals::default(),
        &Totals::default(),
        VALUE_PER_CONVERSION,
        &[],
        Utc::now(),
    );
    assert!(derived.is_empty());
}

#[test]
fn insights_are_newest_first_and_capped() {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let all: Vec<MetricInsight> = (0..8)
        .map(|i| MetricInsight {
            insight_type: InsightType::Recommendation,
            title: format!("t{i}"),
            message: String::new(),
            timestamp: base + chrono::Duration::hours(i),
        })
        .collect();

    let merged = insights::merge_newest_first(all);
    assert_eq!(merged.len(), insights::MAX_INSIGHTS);
    assert_eq!(merged[0].title, "t7");
    assert!(merged.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

//! Aggregation engine over stored rows and connections.

mod test_utils;

use std::sync::Arc;

use campaigniq::aggregation::{AggregationEngine, InsightType, TimeseriesMetric};
use campaigniq::date_range::DateRange;
use campaigniq::error::AppError;
use campaigniq::platform::Platform;
use campaigniq::repositories::{ConnectionCandidate, InsightRepository, MetricsRepository};
use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use test_utils::{connection_repo, day, metric_row, setup_test_db_arc};
use uuid::Uuid;

fn engine(db: Arc<DatabaseConnection>) -> (AggregationEngine, MetricsRepository) {
    let metrics = MetricsRepository::new(db.clone());
    let engine = AggregationEngine::new(
        metrics.clone(),
        Arc::new(connection_repo(db.clone())),
        InsightRepository::new(db),
        100.0,
    );
    (engine, metrics)
}

fn may() -> DateRange {
    DateRange::new(day(2024, 5, 1), day(2024, 5, 7)).unwrap()
}

#[tokio::test]
async fn appended_row_round_trips_into_the_summary() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, metrics) = engine(db);
    let user = Uuid::new_v4();

    metrics
        .append_metrics(vec![metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 3), 100.0, 2.0)])
        .await
        .unwrap();

    let summary = engine.get_metrics_summary(user, may(), None).await.unwrap();
    assert_eq!(summary.total_spend, 100.0);
    assert_eq!(summary.total_conversions, 2.0);
    assert_eq!(summary.overall_roas, 2.0);
    assert_eq!(summary.average_cost_per_conversion, 50.0);
    assert_eq!(summary.average_cpc, 1.0);
    assert!((summary.average_ctr - 0.1).abs() < 1e-12);
}

#[tokio::test]
async fn summary_without_rows_is_all_zero() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, _) = engine(db);

    let summary = engine
        .get_metrics_summary(Uuid::new_v4(), may(), None)
        .await
        .unwrap();
    assert_eq!(summary.total_spend, 0.0);
    assert_eq!(summary.total_impressions, 0);
    assert_eq!(summary.average_ctr, 0.0);
    assert_eq!(summary.overall_roas, 0.0);
    assert_eq!(summary.spend_change, 0.0);
}

#[tokio::test]
async fn summary_change_compares_with_the_previous_period() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, metrics) = engine(db);
    let user = Uuid::new_v4();

    metrics
        .append_metrics(vec![
            // previous period of May 1..=7 is Apr 24..=30
            metric_row(user, Platform::GoogleAds, "c1", day(2024, 4, 28), 100.0, 1.0),
            metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 2), 150.0, 1.0),
        ])
        .await
        .unwrap();

    let summary = engine.get_metrics_summary(user, may(), None).await.unwrap();
    assert_eq!(summary.total_spend, 150.0);
    assert!((summary.spend_change - 50.0).abs() < 1e-9);
    assert_eq!(summary.conversions_change, 0.0);
}

#[tokio::test]
async fn timeseries_has_one_point_per_day() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, metrics) = engine(db);
    let user = Uuid::new_v4();

    metrics
        .append_metrics(vec![
            metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 2), 10.0, 1.0),
            metric_row(user, Platform::TiktokAds, "t1", day(2024, 5, 2), 5.0, 1.0),
        ])
        .await
        .unwrap();

    let points = engine
        .get_performance_timeseries(user, may(), TimeseriesMetric::Spend, None)
        .await
        .unwrap();
    assert_eq!(points.len() as i64, may().day_count());
    assert_eq!(points[0].date, day(2024, 5, 1));
    assert_eq!(points[0].value(), 0.0);
    assert_eq!(points[1].value(), 15.0);

    let google = engine
        .get_performance_timeseries(user, may(), TimeseriesMetric::Spend, Some(Platform::GoogleAds))
        .await
        .unwrap();
    assert_eq!(google[1].value(), 10.0);
    assert_eq!(google[1].platform, Some(Platform::GoogleAds));
}

#[tokio::test]
async fn spend_distribution_sums_to_one_hundred() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, metrics) = engine(db);
    let user = Uuid::new_v4();
    let date = day(2024, 5, 4);

    metrics
        .append_metrics(vec![
            metric_row(user, Platform::GoogleAds, "g", date, 30.0, 1.0),
            metric_row(user, Platform::FacebookAds, "f", date, 60.0, 1.0),
            metric_row(user, Platform::TiktokAds, "t", date, 10.0, 1.0),
        ])
        .await
        .unwrap();

    let distribution = engine.get_spend_distribution(user, may()).await.unwrap();
    let total: f64 = distribution.iter().map(|d| d.percentage).sum();
    assert!((total - 100.0).abs() < 1e-9);
    let facebook = distribution
        .iter()
        .find(|d| d.platform == Platform::FacebookAds)
        .unwrap();
    assert!((facebook.percentage - 60.0).abs() < 1e-9);

    let empty = engine
        .get_spend_distribution(Uuid::new_v4(), may())
        .await
        .unwrap();
    assert!(empty.iter().all(|d| d.percentage == 0.0));
}

#[tokio::test]
async fn top_campaigns_are_ordered_by_roas_and_limited() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, metrics) = engine(db);
    let user = Uuid::new_v4();
    let date = day(2024, 5, 5);

    metrics
        .append_metrics(vec![
            metric_row(user, Platform::GoogleAds, "a", date, 100.0, 4.2),
            metric_row(user, Platform::FacebookAds, "b", date, 100.0, 1.9),
            metric_row(user, Platform::TiktokAds, "c", date, 100.0, 3.8),
        ])
        .await
        .unwrap();

    let top = engine.get_top_campaigns(user, may(), 2, None).await.unwrap();
    let roas: Vec<f64> = top.iter().map(|c| (c.roas * 10.0).round() / 10.0).collect();
    assert_eq!(roas, vec![4.2, 3.8]);
    assert_eq!(top[0].campaign_id, "a");
    assert_eq!(top[1].platform, Platform::TiktokAds);
}

#[tokio::test]
async fn top_campaigns_rejects_out_of_range_limits() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, _) = engine(db);

    for limit in [0, 101] {
        let err = engine
            .get_top_campaigns(Uuid::new_v4(), may(), limit, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "limit", .. }));
    }
}

#[tokio::test]
async fn connected_platform_without_rows_is_reported() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, metrics) = engine(db.clone());
    let user = Uuid::new_v4();

    connection_repo(db)
        .upsert_connection(ConnectionCandidate::new(user, Platform::TiktokAds, "token"))
        .await
        .unwrap();
    metrics
        .append_metrics(vec![metric_row(user, Platform::GoogleAds, "g", day(2024, 5, 2), 20.0, 1.0)])
        .await
        .unwrap();

    let performance = engine.get_platform_performance(user, may()).await.unwrap();
    let platforms: Vec<Platform> = performance.iter().map(|p| p.platform).collect();
    assert_eq!(platforms, vec![Platform::GoogleAds, Platform::TiktokAds]);

    let tiktok = &performance[1];
    assert!(tiktok.is_connected);
    assert_eq!(tiktok.spend, 0.0);
    assert_eq!(tiktok.roas, 0.0);
    assert!(!performance[0].is_connected);
}

#[tokio::test]
async fn insights_merge_stored_and_derived_newest_first() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, _) = engine(db.clone());
    let user = Uuid::new_v4();
    let insights = InsightRepository::new(db.clone());

    let now = Utc::now();
    insights
        .create(user, "alert", "Older", "older insight", now - Duration::days(3))
        .await
        .unwrap();
    insights
        .create(user, "improvement", "Newer", "newer insight", now - Duration::days(1))
        .await
        .unwrap();
    connection_repo(db)
        .upsert_connection(ConnectionCandidate::new(user, Platform::GoogleAds, "token"))
        .await
        .unwrap();

    let found = engine
        .get_metric_insights(user, now.date_naive())
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert!(found.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    // Derived recommendation is stamped now, so it leads
    assert_eq!(found[0].insight_type, InsightType::Recommendation);
    assert_eq!(found[1].title, "Newer");
    assert_eq!(found[2].title, "Older");
}

#[tokio::test]
async fn insights_without_data_or_connections_are_empty() {
    let db = setup_test_db_arc().await.unwrap();
    let (engine, _) = engine(db);

    let found = engine
        .get_metric_insights(Uuid::new_v4(), Utc::now().date_naive())
        .await
        .unwrap();
    assert!(found.is_empty());
}

//! Demo content seeding.

mod test_utils;

use std::sync::Arc;

use campaigniq::aggregation::AggregationEngine;
use campaigniq::date_range::{DEFAULT_WINDOW_DAYS, DateRange};
use campaigniq::demo::{DEMO_CAMPAIGN_PREFIX, DemoContentProvider};
use campaigniq::platform::Platform;
use campaigniq::repositories::{InsightRepository, MetricsRepository};
use test_utils::{connection_repo, create_user, day, setup_test_db_arc};

#[tokio::test]
async fn seeding_is_idempotent_and_feeds_the_views() {
    let db = setup_test_db_arc().await.unwrap();
    let user = create_user(db.clone(), "demo@campaigniq.test").await.unwrap();
    let today = day(2024, 6, 30);

    let provider = DemoContentProvider::new(
        MetricsRepository::new(db.clone()),
        InsightRepository::new(db.clone()),
        100.0,
    );
    let first = provider.seed_user(user, today, DEFAULT_WINDOW_DAYS).await.unwrap();
    assert_eq!(first.metric_rows, 5 * DEFAULT_WINDOW_DAYS);
    assert_eq!(first.insights, 2);

    let second = provider.seed_user(user, today, DEFAULT_WINDOW_DAYS).await.unwrap();
    assert_eq!(second.metric_rows, 0);
    assert_eq!(second.insights, 0);

    let engine = AggregationEngine::new(
        MetricsRepository::new(db.clone()),
        Arc::new(connection_repo(db.clone())),
        InsightRepository::new(db),
        100.0,
    );
    let window = DateRange::last_days(today, DEFAULT_WINDOW_DAYS - 1);

    let top = engine.get_top_campaigns(user, window, 2, None).await.unwrap();
    assert_eq!(top.len(), 2);
    assert!(top.iter().all(|c| c.campaign_id.starts_with(DEMO_CAMPAIGN_PREFIX)));
    assert!((top[0].roas - 4.2).abs() < 1e-6);
    assert_eq!(top[0].platform, Platform::GoogleAds);
    assert!((top[1].roas - 3.8).abs() < 1e-6);

    let insights = engine.get_metric_insights(user, today).await.unwrap();
    assert!(insights.iter().any(|i| i.title == "Welcome to CampaignIQ"));
}

//! Metrics store: append, inclusive range queries and window replacement.

mod test_utils;

use campaigniq::date_range::DateRange;
use campaigniq::platform::Platform;
use campaigniq::repositories::MetricsRepository;
use test_utils::{day, metric_row, setup_test_db_arc};
use uuid::Uuid;

#[tokio::test]
async fn query_includes_both_range_ends() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();

    let rows = vec![
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 4, 30), 1.0, 0.0),
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 1), 2.0, 0.0),
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 7), 3.0, 0.0),
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 8), 4.0, 0.0),
    ];
    assert_eq!(repo.append_metrics(rows).await.unwrap(), 4);

    let range = DateRange::new(day(2024, 5, 1), day(2024, 5, 7)).unwrap();
    let found = repo.query_metrics(user, range, None).await.unwrap();
    let spends: Vec<f64> = found.iter().filter_map(|r| r.spend).collect();
    assert_eq!(spends, vec![2.0, 3.0]);
}

#[tokio::test]
async fn query_is_scoped_by_user_and_platform() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    let date = day(2024, 5, 1);

    repo.append_metrics(vec![
        metric_row(user, Platform::GoogleAds, "g", date, 10.0, 1.0),
        metric_row(user, Platform::TiktokAds, "t", date, 20.0, 1.0),
        metric_row(other, Platform::GoogleAds, "g", date, 99.0, 1.0),
    ])
    .await
    .unwrap();

    let range = DateRange::day(date);
    assert_eq!(repo.query_metrics(user, range, None).await.unwrap().len(), 2);

    let tiktok = repo
        .query_metrics(user, range, Some(Platform::TiktokAds))
        .await
        .unwrap();
    assert_eq!(tiktok.len(), 1);
    assert_eq!(tiktok[0].platform, "tiktok_ads");
    assert_eq!(tiktok[0].spend, Some(20.0));
}

#[tokio::test]
async fn append_keeps_duplicates() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();
    let date = day(2024, 5, 1);

    let row = metric_row(user, Platform::GoogleAds, "c1", date, 5.0, 1.0);
    repo.append_metrics(vec![row.clone()]).await.unwrap();
    repo.append_metrics(vec![row]).await.unwrap();

    let found = repo.query_metrics(user, DateRange::day(date), None).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(repo.append_metrics(Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn unreported_measures_stay_null() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();
    let date = day(2024, 5, 1);

    let mut row = metric_row(user, Platform::FacebookAds, "fb", date, 12.5, 0.0);
    row.conversions = None;
    repo.append_metrics(vec![row]).await.unwrap();

    let stored = &repo.query_metrics(user, DateRange::day(date), None).await.unwrap()[0];
    assert_eq!(stored.spend, Some(12.5));
    assert_eq!(stored.conversions, None);
    assert_eq!(stored.roas, None);
}

#[tokio::test]
async fn replace_window_swaps_only_the_window_of_that_platform() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();

    repo.append_metrics(vec![
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 1), 10.0, 1.0),
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 2), 10.0, 1.0),
        // outside the window
        metric_row(user, Platform::GoogleAds, "c1", day(2024, 4, 30), 7.0, 1.0),
        // other platform inside the window
        metric_row(user, Platform::TiktokAds, "t1", day(2024, 5, 1), 3.0, 1.0),
    ])
    .await
    .unwrap();

    let window = DateRange::new(day(2024, 5, 1), day(2024, 5, 2)).unwrap();
    let fresh = vec![metric_row(user, Platform::GoogleAds, "c1", day(2024, 5, 1), 11.0, 2.0)];
    let (deleted, inserted) = repo
        .replace_window(user, Platform::GoogleAds, window, fresh.clone())
        .await
        .unwrap();
    assert_eq!((deleted, inserted), (2, 1));

    // Running the same replacement again leaves the same rows
    let (deleted, inserted) = repo
        .replace_window(user, Platform::GoogleAds, window, fresh)
        .await
        .unwrap();
    assert_eq!((deleted, inserted), (1, 1));

    let wide = DateRange::new(day(2024, 4, 1), day(2024, 5, 31)).unwrap();
    let google = repo
        .query_metrics(user, wide, Some(Platform::GoogleAds))
        .await
        .unwrap();
    let google_spend: f64 = google.iter().filter_map(|r| r.spend).sum();
    assert_eq!(google.len(), 2);
    assert_eq!(google_spend, 18.0);

    let tiktok = repo
        .query_metrics(user, wide, Some(Platform::TiktokAds))
        .await
        .unwrap();
    assert_eq!(tiktok.len(), 1);
}

#[tokio::test]
async fn replace_window_with_no_rows_clears_it() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();
    let date = day(2024, 5, 3);

    repo.append_metrics(vec![metric_row(user, Platform::InstagramAds, "ig", date, 4.0, 1.0)])
        .await
        .unwrap();
    let (deleted, inserted) = repo
        .replace_window(user, Platform::InstagramAds, DateRange::day(date), Vec::new())
        .await
        .unwrap();

    assert_eq!((deleted, inserted), (1, 0));
    assert!(repo.query_metrics(user, DateRange::day(date), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn large_windows_are_stored_in_several_statements() {
    let db = setup_test_db_arc().await.unwrap();
    let repo = MetricsRepository::new(db);
    let user = Uuid::new_v4();
    let window = DateRange::new(day(2024, 4, 1), day(2024, 4, 30)).unwrap();

    let rows: Vec<_> = (0..70)
        .flat_map(|campaign| {
            (1..=30).map(move |d| {
                metric_row(user, Platform::GoogleAds, &format!("c{campaign}"), day(2024, 4, d), 1.0, 0.0)
            })
        })
        .collect();
    assert_eq!(rows.len(), 2100);

    let (deleted, inserted) = repo
        .replace_window(user, Platform::GoogleAds, window, rows.clone())
        .await
        .unwrap();
    assert_eq!((deleted, inserted), (0, 2100));

    let appended = repo.append_metrics(rows).await.unwrap();
    assert_eq!(appended, 2100);
    assert_eq!(repo.query_metrics(user, window, None).await.unwrap().len(), 4200);
}

//! On-demand and background token refresh.

mod test_utils;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use campaigniq::adapters::AdPlatformAdapter;
use campaigniq::error::AppError;
use campaigniq::platform::Platform;
use campaigniq::repositories::{ConnectionCandidate, OAuthStateRepository, PendingAuthorization};
use campaigniq::server::AppState;
use chrono::{Duration, Utc};
use test_utils::{FakeAdapter, build_state, setup_test_db};
use uuid::Uuid;

async fn state_with(adapter: Arc<FakeAdapter>) -> AppState {
    let db = setup_test_db().await.unwrap();
    build_state(db, vec![adapter as Arc<dyn AdPlatformAdapter>])
}

async fn connect(
    app: &AppState,
    user: Uuid,
    platform: Platform,
    refresh: Option<&str>,
    expires_in: Duration,
) {
    let mut candidate = ConnectionCandidate::new(user, platform, "access-0");
    candidate.refresh_token = refresh.map(str::to_string);
    candidate.account_id = Some("acct-0".to_string());
    candidate.expires_at = Some(Utc::now() + expires_in);
    app.connections.upsert_connection(candidate).await.unwrap();
}

#[tokio::test]
async fn fresh_token_is_returned_without_refreshing() {
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds));
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::GoogleAds, Some("refresh-0"), Duration::hours(2)).await;

    let access = app
        .token_refresh
        .ensure_fresh(user, Platform::GoogleAds)
        .await
        .unwrap();

    assert_eq!(access.access_token, "access-0");
    assert_eq!(access.account_id.as_deref(), Some("acct-0"));
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn expiring_token_is_refreshed_and_keeps_its_refresh_token() {
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds));
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::GoogleAds, Some("refresh-0"), Duration::minutes(2)).await;

    let access = app
        .token_refresh
        .ensure_fresh(user, Platform::GoogleAds)
        .await
        .unwrap();

    assert_eq!(access.access_token, "access-2");
    assert_eq!(adapter.refresh_calls(), 1);
    assert_eq!(
        adapter.last_refresh_material.lock().unwrap().as_deref(),
        Some("refresh-0")
    );

    let stored = app
        .connections
        .get_connection(user, Platform::GoogleAds)
        .await
        .unwrap()
        .unwrap();
    let tokens = app.connections.decrypt_tokens(&stored).unwrap();
    assert_eq!(tokens.access_token, "access-2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-0"));
    assert_eq!(stored.account_id.as_deref(), Some("acct-0"));
    assert!(stored.expires_at.unwrap().with_timezone(&Utc) > Utc::now() + Duration::minutes(30));
}

#[tokio::test]
async fn rejected_refresh_requires_reconnect() {
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds).failing_refresh());
    let app = state_with(adapter).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::GoogleAds, Some("revoked"), Duration::minutes(1)).await;

    let err = app
        .token_refresh
        .ensure_fresh(user, Platform::GoogleAds)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::ReconnectRequired {
            platform: Platform::GoogleAds,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_connection_requires_reconnect() {
    let adapter = Arc::new(FakeAdapter::new(Platform::TiktokAds));
    let app = state_with(adapter).await;

    let err = app
        .token_refresh
        .ensure_fresh(Uuid::new_v4(), Platform::TiktokAds)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReconnectRequired { .. }));
}

#[tokio::test]
async fn expiring_token_without_refresh_material_requires_reconnect() {
    let adapter = Arc::new(FakeAdapter::new(Platform::TiktokAds));
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::TiktokAds, None, Duration::minutes(1)).await;

    let err = app
        .token_refresh
        .ensure_fresh(user, Platform::TiktokAds)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReconnectRequired { .. }));
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn long_lived_access_token_is_its_own_refresh_material() {
    let mut fake = FakeAdapter::new(Platform::FacebookAds).without_pkce();
    fake.refreshes_with_access_token = true;
    let adapter = Arc::new(fake);
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::FacebookAds, None, Duration::minutes(3)).await;

    let access = app
        .token_refresh
        .ensure_fresh(user, Platform::FacebookAds)
        .await
        .unwrap();
    assert_eq!(access.access_token, "access-2");
    assert_eq!(
        adapter.last_refresh_material.lock().unwrap().as_deref(),
        Some("access-0")
    );
}

#[tokio::test]
async fn expired_long_lived_token_cannot_be_re_exchanged() {
    let mut fake = FakeAdapter::new(Platform::FacebookAds).without_pkce();
    fake.refreshes_with_access_token = true;
    let adapter = Arc::new(fake);
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::FacebookAds, None, Duration::minutes(-5)).await;

    let err = app
        .token_refresh
        .ensure_fresh(user, Platform::FacebookAds)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReconnectRequired { .. }));
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let mut fake = FakeAdapter::new(Platform::GoogleAds);
    fake.refresh_delay = StdDuration::from_millis(100);
    let adapter = Arc::new(fake);
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::GoogleAds, Some("refresh-0"), Duration::minutes(1)).await;

    let (first, second) = tokio::join!(
        app.token_refresh.ensure_fresh(user, Platform::GoogleAds),
        app.token_refresh.ensure_fresh(user, Platform::GoogleAds),
    );

    assert_eq!(first.unwrap().access_token, "access-2");
    assert_eq!(second.unwrap().access_token, "access-2");
    assert_eq!(adapter.refresh_calls(), 1);
}

#[tokio::test]
async fn force_refresh_ignores_expiry() {
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds));
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::GoogleAds, Some("refresh-0"), Duration::days(10)).await;

    let updated = app
        .token_refresh
        .force_refresh(user, Platform::GoogleAds)
        .await
        .unwrap();
    assert_eq!(adapter.refresh_calls(), 1);
    let tokens = app.connections.decrypt_tokens(&updated).unwrap();
    assert_eq!(tokens.access_token, "access-2");
}

#[tokio::test]
async fn tick_refreshes_due_connections_and_purges_stale_states() {
    let db = setup_test_db().await.unwrap();
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds));
    let app = build_state(db.clone(), vec![adapter.clone() as Arc<dyn AdPlatformAdapter>]);

    let due_user = Uuid::new_v4();
    let later_user = Uuid::new_v4();
    connect(&app, due_user, Platform::GoogleAds, Some("refresh-0"), Duration::minutes(5)).await;
    connect(&app, later_user, Platform::GoogleAds, Some("refresh-0"), Duration::days(1)).await;

    let states = OAuthStateRepository::new(Arc::new(db));
    let pending = || PendingAuthorization {
        state: "state".to_string(),
        code_verifier: None,
        client_pkce: false,
    };
    states
        .create_or_replace(Uuid::new_v4(), Platform::GoogleAds, pending(), Duration::seconds(-60))
        .await
        .unwrap();
    states
        .create_or_replace(Uuid::new_v4(), Platform::GoogleAds, pending(), Duration::minutes(15))
        .await
        .unwrap();

    let stats = app.token_refresh.tick(Utc::now()).await.unwrap();
    assert_eq!(stats.connections_polled, 1);
    assert_eq!(stats.refreshes_succeeded, 1);
    assert_eq!(stats.refreshes_failed, 0);
    assert_eq!(stats.oauth_states_purged, 1);
    assert_eq!(adapter.refresh_calls(), 1);

    let refreshed = app
        .connections
        .get_connection(due_user, Platform::GoogleAds)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        app.connections.decrypt_tokens(&refreshed).unwrap().access_token,
        "access-2"
    );
}

#[tokio::test]
async fn tick_counts_failed_refreshes() {
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds).failing_refresh());
    let app = state_with(adapter).await;
    connect(&app, Uuid::new_v4(), Platform::GoogleAds, Some("r"), Duration::minutes(1)).await;
    connect(&app, Uuid::new_v4(), Platform::GoogleAds, Some("r"), Duration::minutes(2)).await;

    let stats = app.token_refresh.tick(Utc::now()).await.unwrap();
    assert_eq!(stats.connections_polled, 2);
    assert_eq!(stats.refreshes_succeeded, 0);
    assert_eq!(stats.refreshes_failed, 2);
}

#[tokio::test]
async fn tick_skips_a_connection_refreshed_while_it_waited() {
    let mut fake = FakeAdapter::new(Platform::GoogleAds);
    fake.refresh_delay = StdDuration::from_millis(150);
    let adapter = Arc::new(fake);
    let app = state_with(adapter.clone()).await;
    let user = Uuid::new_v4();
    connect(&app, user, Platform::GoogleAds, Some("refresh-0"), Duration::minutes(1)).await;

    // ensure_fresh holds the pair lock when the tick scans the stale row
    let (access, stats) = tokio::join!(
        app.token_refresh.ensure_fresh(user, Platform::GoogleAds),
        async {
            tokio::time::sleep(StdDuration::from_millis(30)).await;
            app.token_refresh.tick(Utc::now()).await
        },
    );

    assert_eq!(access.unwrap().access_token, "access-2");
    let stats = stats.unwrap();
    assert_eq!(stats.connections_polled, 1);
    assert_eq!(stats.refreshes_succeeded, 0);
    assert_eq!(stats.refreshes_skipped, 1);
    assert_eq!(adapter.refresh_calls(), 1);
    assert_eq!(
        adapter.last_refresh_material.lock().unwrap().as_deref(),
        Some("refresh-0")
    );
}

#[tokio::test]
async fn pair_locks_are_released_after_use() {
    let adapter = Arc::new(FakeAdapter::new(Platform::GoogleAds));
    let app = state_with(adapter).await;
    let fresh_user = Uuid::new_v4();
    let due_user = Uuid::new_v4();
    connect(&app, fresh_user, Platform::GoogleAds, Some("refresh-0"), Duration::hours(2)).await;
    connect(&app, due_user, Platform::GoogleAds, Some("refresh-0"), Duration::minutes(1)).await;

    app.token_refresh
        .ensure_fresh(fresh_user, Platform::GoogleAds)
        .await
        .unwrap();
    app.token_refresh
        .force_refresh(fresh_user, Platform::GoogleAds)
        .await
        .unwrap();
    let _ = app
        .token_refresh
        .ensure_fresh(Uuid::new_v4(), Platform::GoogleAds)
        .await;
    app.token_refresh.tick(Utc::now()).await.unwrap();

    assert_eq!(app.token_refresh.in_flight_pairs().await, 0);
}

//! Test utilities shared by the integration tests.
//!
//! Provides an in-memory SQLite database with migrations applied, a test
//! configuration, fixture helpers and [`FakeAdapter`], a scripted platform
//! adapter that records what the services asked of it.

use anyhow::Result;
use async_trait::async_trait;
use campaigniq::{
    adapters::{
        AdPlatformAdapter, AdPlatformMetrics, AdapterMetadata, AdapterRegistry, ReportingAccess,
        TokenResult,
    },
    auth::issue_session_token,
    config::AppConfig,
    crypto::CryptoKey,
    date_range::DateRange,
    error::{AppError, AppResult},
    platform::Platform,
    repositories::{ConnectionRepository, NewCampaignMetric, NewUser, UserRepository},
    server::AppState,
};
use chrono::NaiveDate;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

pub const TEST_SESSION_SECRET: &str = "integration-session-secret-0123456789";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // Fixtures reference users that are never inserted
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Configuration with a fixed crypto key and session secret.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(vec![7u8; 32]),
        session_secret: Some(TEST_SESSION_SECRET.to_string()),
        redirect_uri_base: "http://api.campaigniq.test".to_string(),
        frontend_base_url: "http://app.campaigniq.test".to_string(),
        ..AppConfig::default()
    };
    config.token_refresh.jitter_factor = 0.0;
    config
}

#[allow(dead_code)]
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("test key")
}

#[allow(dead_code)]
pub fn connection_repo(db: Arc<DatabaseConnection>) -> ConnectionRepository {
    ConnectionRepository::new(db, test_crypto_key())
}

/// Inserts a user and returns its id.
#[allow(dead_code)]
pub async fn create_user(db: Arc<DatabaseConnection>, email: &str) -> Result<Uuid> {
    let user = UserRepository::new(db)
        .create(NewUser {
            email: email.to_string(),
            name: Some("Test User".to_string()),
            ..Default::default()
        })
        .await?;
    Ok(user.id)
}

#[allow(dead_code)]
pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A metric row carrying spend, conversions, clicks and impressions.
#[allow(dead_code)]
pub fn metric_row(
    user_id: Uuid,
    platform: Platform,
    campaign_id: &str,
    date: NaiveDate,
    spend: f64,
    conversions: f64,
) -> NewCampaignMetric {
    let mut row = NewCampaignMetric::new(user_id, platform, campaign_id, campaign_id, date);
    row.spend = Some(spend);
    row.conversions = Some(conversions);
    row.clicks = Some(100);
    row.impressions = Some(1000);
    row
}

/// `Authorization` header value for a fresh session of `user_id`.
#[allow(dead_code)]
pub fn bearer(config: &AppConfig, user_id: Uuid) -> String {
    let token = issue_session_token(config, user_id, chrono::Duration::hours(1))
        .expect("session token");
    format!("Bearer {token}")
}

/// Full application state over `db` with the given adapters registered.
#[allow(dead_code)]
pub fn build_state(db: DatabaseConnection, adapters: Vec<Arc<dyn AdPlatformAdapter>>) -> AppState {
    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    AppState::new(Arc::new(test_config()), db, registry).expect("app state")
}

/// Scripted adapter. Exchange and refresh answers are fixed at construction;
/// calls are counted so tests can assert on them.
#[allow(dead_code)]
pub struct FakeAdapter {
    pub platform: Platform,
    pub supports_pkce: bool,
    pub refreshes_with_access_token: bool,
    pub fail_exchange: bool,
    pub fail_refresh: bool,
    pub fail_metrics: bool,
    pub refresh_delay: Duration,
    pub exchange_tokens: TokenResult,
    pub refresh_tokens: TokenResult,
    pub metrics: Vec<AdPlatformMetrics>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub metrics_calls: AtomicUsize,
    pub last_code_verifier: Mutex<Option<String>>,
    pub last_refresh_material: Mutex<Option<String>>,
    pub last_access_token: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl FakeAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            supports_pkce: true,
            refreshes_with_access_token: false,
            fail_exchange: false,
            fail_refresh: false,
            fail_metrics: false,
            refresh_delay: Duration::ZERO,
            exchange_tokens: TokenResult {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in_seconds: Some(3600),
                account_id: Some("acct-1".to_string()),
                account_name: Some("Primary Account".to_string()),
                ..TokenResult::default()
            },
            refresh_tokens: TokenResult {
                access_token: "access-2".to_string(),
                refresh_token: None,
                expires_in_seconds: Some(3600),
                ..TokenResult::default()
            },
            metrics: Vec::new(),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
            last_code_verifier: Mutex::new(None),
            last_refresh_material: Mutex::new(None),
            last_access_token: Mutex::new(None),
        }
    }

    pub fn without_pkce(mut self) -> Self {
        self.supports_pkce = false;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<AdPlatformMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn failing_exchange(mut self) -> Self {
        self.fail_exchange = true;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn failing_metrics(mut self) -> Self {
        self.fail_metrics = true;
        self
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdPlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn metadata(&self) -> AdapterMetadata {
        let metadata = AdapterMetadata::new(self.platform, &["ads.read"], self.supports_pkce);
        if self.refreshes_with_access_token {
            metadata.with_access_token_refresh()
        } else {
            metadata
        }
    }

    fn generate_auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> AppResult<Url> {
        let mut url = Url::parse("https://auth.platform.test/authorize")
            .map_err(|e| AppError::integration(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        if let Some(challenge) = code_challenge {
            url.query_pairs_mut()
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", "S256");
        }
        Ok(url)
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<TokenResult> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code_verifier.lock().unwrap() = code_verifier.map(str::to_string);
        if self.fail_exchange {
            return Err(AppError::OAuthExchange {
                platform: self.platform,
                http_status: Some(400),
                platform_message: "invalid_grant".to_string(),
            });
        }
        Ok(self.exchange_tokens.clone())
    }

    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResult> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_material.lock().unwrap() = Some(refresh_token.to_string());
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if self.fail_refresh {
            return Err(AppError::OAuthExchange {
                platform: self.platform,
                http_status: Some(400),
                platform_message: "invalid_grant".to_string(),
            });
        }
        Ok(self.refresh_tokens.clone())
    }

    async fn fetch_campaign_metrics(
        &self,
        access: &ReportingAccess,
        _range: DateRange,
    ) -> AppResult<Vec<AdPlatformMetrics>> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_access_token.lock().unwrap() = Some(access.access_token.clone());
        if self.fail_metrics {
            return Err(AppError::PlatformApi {
                platform: self.platform,
                http_status: Some(500),
                platform_message: "backend error".to_string(),
            });
        }
        Ok(self.metrics.clone())
    }

    async fn fetch_campaign_details(
        &self,
        _access: &ReportingAccess,
        campaign_id: &str,
        range: DateRange,
    ) -> AppResult<AdPlatformMetrics> {
        Ok(AdPlatformMetrics::new(
            self.platform,
            range.start,
            campaign_id,
            campaign_id,
        ))
    }
}

//! Platform adapter trait definition
//!
//! Every ad platform implements [`AdPlatformAdapter`]. Callers pick an
//! instance from the registry and never branch on platform identity.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::adapters::AdapterMetadata;
use crate::date_range::DateRange;
use crate::error::AppResult;
use crate::platform::Platform;

/// Normalized result of a code exchange or token refresh.
#[derive(Clone, Default)]
pub struct TokenResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: Option<i64>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    /// Non-secret fields of the token response (token type, scope, ...)
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenResult {
    /// Absolute expiry computed from `expires_in_seconds`, relative to `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in_seconds
            .filter(|seconds| *seconds > 0)
            .map(|seconds| now + Duration::seconds(seconds))
    }
}

impl std::fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("account_id", &self.account_id)
            .field("account_name", &self.account_name)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Credentials an adapter needs to read a user's reports.
#[derive(Clone)]
pub struct ReportingAccess {
    pub access_token: String,
    /// Ad account the connection resolved at exchange time
    pub account_id: Option<String>,
}

impl ReportingAccess {
    pub fn new(access_token: impl Into<String>, account_id: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            account_id,
        }
    }
}

impl std::fmt::Debug for ReportingAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingAccess")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// One campaign's performance on one day, in the shared shape.
///
/// Currency values are in the account currency (never micros); ratios are
/// fractions (0.05, not 5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdPlatformMetrics {
    pub platform: Platform,
    pub date: NaiveDate,
    pub campaign_id: String,
    pub campaign_name: String,
    pub spend: Option<f64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub conversions: Option<f64>,
    pub cost_per_conversion: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub roas: Option<f64>,
    pub conversion_value: Option<f64>,
}

impl AdPlatformMetrics {
    pub fn new(
        platform: Platform,
        date: NaiveDate,
        campaign_id: impl Into<String>,
        campaign_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            date,
            campaign_id: campaign_id.into(),
            campaign_name: campaign_name.into(),
            spend: None,
            impressions: None,
            clicks: None,
            conversions: None,
            cost_per_conversion: None,
            conversion_rate: None,
            ctr: None,
            cpc: None,
            roas: None,
            conversion_value: None,
        }
    }
}

#[async_trait]
pub trait AdPlatformAdapter: Send + Sync {
    /// Platform this instance serves.
    fn platform(&self) -> Platform;

    /// Static description used by discovery endpoints.
    fn metadata(&self) -> AdapterMetadata;

    /// Build the platform's authorize URL. Pure: no I/O.
    ///
    /// `code_challenge` is included only when the platform supports PKCE.
    fn generate_auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> AppResult<Url>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<TokenResult>;

    /// Obtain a fresh access token from stored refresh material.
    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResult>;

    /// Per-campaign, per-day metrics for every day in `range`.
    async fn fetch_campaign_metrics(
        &self,
        access: &ReportingAccess,
        range: DateRange,
    ) -> AppResult<Vec<AdPlatformMetrics>>;

    /// One campaign's metrics summed over `range`; `date` is `range.start`.
    async fn fetch_campaign_details(
        &self,
        access: &ReportingAccess,
        campaign_id: &str,
        range: DateRange,
    ) -> AppResult<AdPlatformMetrics>;
}

//! TikTok for Business adapter
//!
//! Every Marketing API response is wrapped in `{code, message, data}`; a
//! non-zero `code` is a failure even when the HTTP status is 200.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapters::http::{
    Endpoint, build_client, decode_json, lenient_f64, lenient_i64, lenient_id, ratio,
    transport_error, upstream_error,
};
use crate::adapters::{AdPlatformAdapter, AdPlatformMetrics, AdapterMetadata, ReportingAccess, TokenResult};
use crate::config::TikTokAdsConfig;
use crate::date_range::DateRange;
use crate::error::{AppError, AppResult};
use crate::platform::Platform;

const API_PREFIX: &str = "open_api/v1.3";
const REPORT_PAGE_SIZE: u32 = 1000;
const REPORT_PAGE_LIMIT: u32 = 200;
const REPORT_METRICS: &[&str] = &[
    "campaign_name",
    "spend",
    "impressions",
    "clicks",
    "ctr",
    "cpc",
    "conversion",
    "cost_per_conversion",
    "conversion_rate",
    "complete_payment_roas",
];

pub struct TikTokAdsAdapter {
    app_id: String,
    app_secret: String,
    auth_url: String,
    api_base: String,
    http_client: Client,
}

/// `data` is decoded only once `code` is known to be 0; failures often carry `{}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TikTokToken {
    access_token: String,
    refresh_token: Option<String>,
    access_token_expire_in: Option<i64>,
    #[serde(default)]
    advertiser_ids: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_id")]
    advertiser_id: Option<String>,
    advertiser_name: Option<String>,
    scope: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReportData {
    #[serde(default)]
    list: Vec<ReportRow>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    total_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    dimensions: ReportDimensions,
    #[serde(default)]
    metrics: ReportMetrics,
}

#[derive(Debug, Deserialize)]
struct ReportDimensions {
    #[serde(default, deserialize_with = "lenient_id")]
    campaign_id: Option<String>,
    stat_time_day: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportMetrics {
    campaign_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    spend: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    impressions: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    clicks: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    ctr: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    cpc: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    conversion: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    cost_per_conversion: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    conversion_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    complete_payment_roas: Option<f64>,
}

/// `stat_time_day` arrives as `2024-04-01 00:00:00`.
fn parse_stat_day(value: &str) -> Option<NaiveDate> {
    let day = value.split_whitespace().next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn percent_to_ratio(value: Option<f64>) -> Option<f64> {
    value.map(|v| v / 100.0)
}

impl TikTokAdsAdapter {
    pub fn new(config: &TikTokAdsConfig, timeout: Duration) -> AppResult<Self> {
        let (Some(app_id), Some(app_secret)) = (config.app_id.clone(), config.app_secret.clone())
        else {
            return Err(AppError::integration("TikTok app credentials missing"));
        };

        Ok(Self {
            app_id,
            app_secret,
            auth_url: config.auth_url.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http_client: build_client(timeout)?,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, API_PREFIX, path)
    }

    /// Unwrap the `{code, message, data}` envelope.
    fn unwrap_envelope<T: DeserializeOwned>(endpoint: Endpoint, envelope: Envelope) -> AppResult<T> {
        if envelope.code != 0 {
            let message = if envelope.message.is_empty() {
                format!("error code {}", envelope.code)
            } else {
                envelope.message
            };
            return Err(upstream_error(Platform::TiktokAds, endpoint, None, message));
        }
        let data = envelope
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| upstream_error(Platform::TiktokAds, endpoint, None, "response carried no data"))?;
        serde_json::from_value(data).map_err(|e| {
            upstream_error(Platform::TiktokAds, endpoint, None, format!("malformed response: {e}"))
        })
    }

    async fn post_token<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> AppResult<T> {
        let response = self
            .http_client
            .post(self.api_url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(Platform::TiktokAds, Endpoint::Token, e))?;

        let envelope: Envelope = decode_json(Platform::TiktokAds, Endpoint::Token, response).await?;
        Self::unwrap_envelope(Endpoint::Token, envelope)
    }

    async fn report_page(
        &self,
        access: &ReportingAccess,
        advertiser_id: &str,
        range: DateRange,
        page: u32,
    ) -> AppResult<ReportData> {
        let dimensions = json!(["campaign_id", "stat_time_day"]).to_string();
        let metrics = json!(REPORT_METRICS).to_string();
        let start = range.start.format("%Y-%m-%d").to_string();
        let end = range.end.format("%Y-%m-%d").to_string();
        let page = page.to_string();
        let page_size = REPORT_PAGE_SIZE.to_string();

        let response = self
            .http_client
            .get(self.api_url("report/integrated/get/"))
            .header("Access-Token", &access.access_token)
            .query(&[
                ("advertiser_id", advertiser_id),
                ("report_type", "BASIC"),
                ("data_level", "AUCTION_CAMPAIGN"),
                ("dimensions", dimensions.as_str()),
                ("metrics", metrics.as_str()),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("page", page.as_str()),
                ("page_size", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(Platform::TiktokAds, Endpoint::Reporting, e))?;

        let envelope: Envelope =
            decode_json(Platform::TiktokAds, Endpoint::Reporting, response).await?;
        Self::unwrap_envelope(Endpoint::Reporting, envelope)
    }

    fn normalize(row: ReportRow) -> Option<AdPlatformMetrics> {
        let campaign_id = row.dimensions.campaign_id?;
        let date = row.dimensions.stat_time_day.as_deref().and_then(parse_stat_day)?;
        let metrics = row.metrics;

        let mut record = AdPlatformMetrics::new(
            Platform::TiktokAds,
            date,
            campaign_id.clone(),
            metrics.campaign_name.unwrap_or(campaign_id),
        );
        record.spend = metrics.spend;
        record.impressions = metrics.impressions;
        record.clicks = metrics.clicks;
        record.conversions = metrics.conversion;
        record.ctr = percent_to_ratio(metrics.ctr);
        record.cpc = metrics.cpc;
        record.cost_per_conversion = metrics
            .cost_per_conversion
            .or_else(|| ratio(record.spend, record.conversions));
        record.conversion_rate = percent_to_ratio(metrics.conversion_rate);
        record.roas = metrics.complete_payment_roas;
        record.conversion_value = match (record.roas, record.spend) {
            (Some(roas), Some(spend)) => Some(roas * spend),
            _ => None,
        };
        Some(record)
    }
}

fn token_result(token: TikTokToken) -> TokenResult {
    let account_id = token.advertiser_id.or_else(|| {
        token.advertiser_ids.first().map(|id| match id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    });

    let mut extra = serde_json::Map::new();
    if let Some(scope) = token.scope {
        extra.insert("scope".into(), scope);
    }
    if !token.advertiser_ids.is_empty() {
        extra.insert("advertiser_ids".into(), token.advertiser_ids.into());
    }

    TokenResult {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_in_seconds: token.access_token_expire_in,
        account_id,
        account_name: token.advertiser_name,
        extra,
    }
}

#[async_trait]
impl AdPlatformAdapter for TikTokAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::TiktokAds
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata::new(Platform::TiktokAds, &[], false).without_campaign_details()
    }

    fn generate_auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> AppResult<Url> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| AppError::integration(format!("invalid TikTok auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("app_id", &self.app_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("response_type", "code");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> AppResult<TokenResult> {
        let token: TikTokToken = self
            .post_token(
                "oauth2/access_token/",
                json!({
                    "app_id": self.app_id,
                    "secret": self.app_secret,
                    "auth_code": code,
                    "auth_type": "authorization_code",
                }),
            )
            .await?;

        info!(
            advertisers = token.advertiser_ids.len(),
            "Exchanged TikTok authorization code"
        );
        Ok(token_result(token))
    }

    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResult> {
        let token: TikTokToken = self
            .post_token(
                "oauth2/refresh_token/",
                json!({
                    "app_id": self.app_id,
                    "secret": self.app_secret,
                    "refresh_token": refresh_token,
                }),
            )
            .await?;
        Ok(token_result(token))
    }

    async fn fetch_campaign_metrics(
        &self,
        access: &ReportingAccess,
        range: DateRange,
    ) -> AppResult<Vec<AdPlatformMetrics>> {
        let Some(advertiser_id) = access.account_id.as_deref().filter(|id| !id.is_empty()) else {
            return Err(upstream_error(
                Platform::TiktokAds,
                Endpoint::Reporting,
                None,
                "connection has no advertiser id",
            ));
        };

        let mut records = Vec::new();
        for page in 1..=REPORT_PAGE_LIMIT {
            let data = self.report_page(access, advertiser_id, range, page).await?;
            let total_pages = data
                .page_info
                .as_ref()
                .and_then(|info| info.total_page)
                .unwrap_or(1);
            let empty = data.list.is_empty();
            records.extend(data.list.into_iter().filter_map(Self::normalize));

            if empty || page >= total_pages {
                break;
            }
            if page == REPORT_PAGE_LIMIT {
                warn!(advertiser_id, "TikTok report stopped at page limit");
            }
        }

        debug!(records = records.len(), "Fetched TikTok report");
        Ok(records)
    }

    async fn fetch_campaign_details(
        &self,
        _access: &ReportingAccess,
        _campaign_id: &str,
        _range: DateRange,
    ) -> AppResult<AdPlatformMetrics> {
        Err(AppError::UnsupportedOperation {
            platform: Platform::TiktokAds,
            operation: "fetch_campaign_details",
        })
    }
}

//! Meta (Facebook / Instagram) Ads adapter
//!
//! One app serves both placements, so the same type is registered twice with
//! a different [`Platform`]. Insights are broken down by `publisher_platform`
//! and each instance keeps only its own placement: `instagram` rows go to
//! instagram_ads, every other Meta placement goes to facebook_ads.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapters::http::{
    Endpoint, build_client, decode_json, lenient_f64, lenient_i64, ratio, transport_error,
    upstream_error,
};
use crate::adapters::{AdPlatformAdapter, AdPlatformMetrics, AdapterMetadata, ReportingAccess, TokenResult};
use crate::config::MetaAdsConfig;
use crate::date_range::DateRange;
use crate::error::{AppError, AppResult};
use crate::platform::Platform;

pub const META_SCOPES: &str = "ads_management,ads_read";

/// Action types counted as conversions.
const CONVERSION_ACTION_TYPES: [&str; 2] = ["purchase", "offsite_conversion"];

const INSIGHT_FIELDS: &str =
    "campaign_id,campaign_name,spend,impressions,clicks,ctr,cpc,actions,action_values";
const INSIGHTS_PAGE_LIMIT: usize = 200;

type HmacSha256 = Hmac<Sha256>;

pub struct MetaAdsAdapter {
    platform: Platform,
    app_id: String,
    app_secret: String,
    graph_base: String,
    dialog_base: String,
    graph_version: String,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct MetaTokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AdAccounts {
    #[serde(default)]
    data: Vec<AdAccount>,
}

#[derive(Debug, Deserialize)]
struct AdAccount {
    id: Option<String>,
    account_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightsPage {
    #[serde(default)]
    data: Vec<InsightRow>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightRow {
    campaign_id: Option<String>,
    campaign_name: Option<String>,
    date_start: Option<String>,
    publisher_platform: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    spend: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    impressions: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    clicks: Option<i64>,
    #[serde(default)]
    actions: Option<Vec<ActionValue>>,
    #[serde(default)]
    action_values: Option<Vec<ActionValue>>,
}

#[derive(Debug, Deserialize)]
struct ActionValue {
    action_type: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    value: Option<f64>,
}

/// Sum of `value` over the conversion action types, `None` when none are present.
fn sum_conversion_actions(actions: Option<&[ActionValue]>) -> Option<f64> {
    let matching: Vec<f64> = actions?
        .iter()
        .filter(|action| CONVERSION_ACTION_TYPES.contains(&action.action_type.as_str()))
        .map(|action| action.value.unwrap_or(0.0))
        .collect();
    if matching.is_empty() {
        None
    } else {
        Some(matching.iter().sum())
    }
}

fn add(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    match (left, right) {
        (None, None) => None,
        (l, r) => Some(l.unwrap_or(0.0) + r.unwrap_or(0.0)),
    }
}

fn add_i64(left: Option<i64>, right: Option<i64>) -> Option<i64> {
    match (left, right) {
        (None, None) => None,
        (l, r) => Some(l.unwrap_or(0) + r.unwrap_or(0)),
    }
}

impl MetaAdsAdapter {
    pub fn new(platform: Platform, config: &MetaAdsConfig, timeout: Duration) -> AppResult<Self> {
        if !matches!(platform, Platform::FacebookAds | Platform::InstagramAds) {
            return Err(AppError::integration(format!(
                "Meta adapter cannot serve {platform}"
            )));
        }
        let (Some(app_id), Some(app_secret)) = (config.app_id.clone(), config.app_secret.clone())
        else {
            return Err(AppError::integration("Meta app credentials missing"));
        };

        Ok(Self {
            platform,
            app_id,
            app_secret,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            dialog_base: config.dialog_base.trim_end_matches('/').to_string(),
            graph_version: config.graph_version.clone(),
            http_client: build_client(timeout)?,
        })
    }

    fn graph_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.graph_base, self.graph_version, path)
    }

    /// `hex(HMAC-SHA256(app_secret, access_token))`, required on server-side Graph calls.
    fn appsecret_proof(&self, access_token: &str) -> AppResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.app_secret.as_bytes())
            .map_err(|e| AppError::integration(format!("invalid Meta app secret: {e}")))?;
        mac.update(access_token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn token_get(&self, params: &[(&str, &str)]) -> AppResult<MetaTokenResponse> {
        let response = self
            .http_client
            .get(self.graph_url("oauth/access_token"))
            .query(params)
            .send()
            .await
            .map_err(|e| transport_error(self.platform, Endpoint::Token, e))?;
        decode_json(self.platform, Endpoint::Token, response).await
    }

    /// Swap a token for a long-lived one (`grant_type=fb_exchange_token`).
    async fn long_lived_token(&self, token: &str) -> AppResult<MetaTokenResponse> {
        self.token_get(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", &self.app_id),
            ("client_secret", &self.app_secret),
            ("fb_exchange_token", token),
        ])
        .await
    }

    async fn first_ad_account(&self, access_token: &str) -> AppResult<Option<(String, Option<String>)>> {
        let proof = self.appsecret_proof(access_token)?;
        let response = self
            .http_client
            .get(self.graph_url("me/adaccounts"))
            .query(&[
                ("fields", "account_id,name"),
                ("access_token", access_token),
                ("appsecret_proof", proof.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(self.platform, Endpoint::Reporting, e))?;

        let accounts: AdAccounts = decode_json(self.platform, Endpoint::Reporting, response).await?;
        Ok(accounts.data.into_iter().find_map(|account| {
            let id = account
                .account_id
                .or_else(|| account.id.map(|id| id.trim_start_matches("act_").to_string()))?;
            Some((id, account.name))
        }))
    }

    async fn ad_account_id(&self, access: &ReportingAccess) -> AppResult<String> {
        if let Some(id) = access.account_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.trim_start_matches("act_").to_string());
        }
        self.first_ad_account(&access.access_token)
            .await?
            .map(|(id, _)| id)
            .ok_or_else(|| {
                upstream_error(
                    self.platform,
                    Endpoint::Reporting,
                    None,
                    "no ad account available for this connection",
                )
            })
    }

    /// Fetches every page of an insights edge, following `paging.next`.
    async fn insights(
        &self,
        path: &str,
        access_token: &str,
        range: DateRange,
        by_day: bool,
    ) -> AppResult<Vec<InsightRow>> {
        let proof = self.appsecret_proof(access_token)?;
        let time_range = serde_json::json!({
            "since": range.start.format("%Y-%m-%d").to_string(),
            "until": range.end.format("%Y-%m-%d").to_string(),
        })
        .to_string();

        let mut query: Vec<(&str, &str)> = vec![
            ("level", "campaign"),
            ("fields", INSIGHT_FIELDS),
            ("breakdowns", "publisher_platform"),
            ("time_range", time_range.as_str()),
            ("limit", "500"),
            ("access_token", access_token),
            ("appsecret_proof", proof.as_str()),
        ];
        if by_day {
            query.push(("time_increment", "1"));
        }

        let first = Url::parse_with_params(&self.graph_url(path), &query)
            .map_err(|e| AppError::integration(format!("invalid Graph URL: {e}")))?;

        let mut rows = Vec::new();
        let mut next = Some(first);
        for _ in 0..INSIGHTS_PAGE_LIMIT {
            let Some(url) = next.take() else {
                return Ok(rows);
            };
            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| transport_error(self.platform, Endpoint::Reporting, e))?;
            let page: InsightsPage =
                decode_json(self.platform, Endpoint::Reporting, response).await?;
            rows.extend(page.data);

            next = page
                .paging
                .and_then(|paging| paging.next)
                .and_then(|next| Url::parse(&next).ok());
        }

        if next.is_some() {
            warn!(platform = %self.platform, "Meta insights stopped at page limit");
        }
        Ok(rows)
    }

    fn placement_matches(&self, publisher_platform: Option<&str>) -> bool {
        let is_instagram = publisher_platform == Some("instagram");
        match self.platform {
            Platform::InstagramAds => is_instagram,
            _ => !is_instagram,
        }
    }

    /// Keeps this instance's placement and merges placements that share a
    /// (campaign, day) key.
    fn normalize(&self, rows: Vec<InsightRow>, fallback_date: NaiveDate) -> Vec<AdPlatformMetrics> {
        let mut merged: BTreeMap<(NaiveDate, String), AdPlatformMetrics> = BTreeMap::new();

        for row in rows {
            if !self.placement_matches(row.publisher_platform.as_deref()) {
                continue;
            }
            let date = row
                .date_start
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .unwrap_or(fallback_date);
            let campaign_id = row.campaign_id.clone().unwrap_or_default();
            let conversions = sum_conversion_actions(row.actions.as_deref());
            let conversion_value = sum_conversion_actions(row.action_values.as_deref());

            let entry = merged
                .entry((date, campaign_id.clone()))
                .or_insert_with(|| {
                    AdPlatformMetrics::new(
                        self.platform,
                        date,
                        campaign_id.clone(),
                        row.campaign_name.clone().unwrap_or_else(|| campaign_id.clone()),
                    )
                });
            entry.spend = add(entry.spend, row.spend);
            entry.impressions = add_i64(entry.impressions, row.impressions);
            entry.clicks = add_i64(entry.clicks, row.clicks);
            entry.conversions = add(entry.conversions, conversions);
            entry.conversion_value = add(entry.conversion_value, conversion_value);
        }

        merged
            .into_values()
            .map(|mut record| {
                let clicks = record.clicks.map(|c| c as f64);
                record.ctr = ratio(clicks, record.impressions.map(|i| i as f64));
                record.cpc = ratio(record.spend, clicks);
                record.cost_per_conversion = ratio(record.spend, record.conversions);
                record.conversion_rate = ratio(record.conversions, clicks);
                record.roas = ratio(record.conversion_value, record.spend);
                record
            })
            .collect()
    }
}

#[async_trait]
impl AdPlatformAdapter for MetaAdsAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata::new(self.platform, &["ads_management", "ads_read"], false)
            .with_access_token_refresh()
    }

    fn generate_auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> AppResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/{}/dialog/oauth",
            self.dialog_base, self.graph_version
        ))
        .map_err(|e| AppError::integration(format!("invalid Meta dialog URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("response_type", "code")
            .append_pair("scope", META_SCOPES);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> AppResult<TokenResult> {
        let short_lived = self
            .token_get(&[
                ("client_id", &self.app_id),
                ("client_secret", &self.app_secret),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .await?;

        // Both hops must succeed; the short-lived token is never surfaced
        let long_lived = self.long_lived_token(&short_lived.access_token).await?;
        info!(platform = %self.platform, "Exchanged code for long-lived Meta token");

        let (account_id, account_name) = match self.first_ad_account(&long_lived.access_token).await {
            Ok(Some((id, name))) => (Some(id), name),
            Ok(None) => (None, None),
            Err(err) => {
                warn!(platform = %self.platform, error = %err, "Meta ad account lookup failed; continuing without account");
                (None, None)
            }
        };

        let mut result = token_result(long_lived);
        result.account_id = account_id;
        result.account_name = account_name;
        Ok(result)
    }

    /// Meta has no refresh tokens: the current long-lived token is re-exchanged.
    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResult> {
        let long_lived = self.long_lived_token(refresh_token).await?;
        Ok(token_result(long_lived))
    }

    async fn fetch_campaign_metrics(
        &self,
        access: &ReportingAccess,
        range: DateRange,
    ) -> AppResult<Vec<AdPlatformMetrics>> {
        let account_id = self.ad_account_id(access).await?;
        let rows = self
            .insights(
                &format!("act_{account_id}/insights"),
                &access.access_token,
                range,
                true,
            )
            .await?;

        let records = self.normalize(rows, range.start);
        debug!(platform = %self.platform, records = records.len(), "Fetched Meta insights");
        Ok(records)
    }

    async fn fetch_campaign_details(
        &self,
        access: &ReportingAccess,
        campaign_id: &str,
        range: DateRange,
    ) -> AppResult<AdPlatformMetrics> {
        if campaign_id.is_empty() || !campaign_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::validation("campaignId", "Meta campaign ids are numeric"));
        }

        let rows = self
            .insights(
                &format!("{campaign_id}/insights"),
                &access.access_token,
                range,
                false,
            )
            .await?;

        // Without time_increment every row already spans the whole range
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.date_start = None;
                row
            })
            .collect();

        Ok(self
            .normalize(rows, range.start)
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                AdPlatformMetrics::new(self.platform, range.start, campaign_id, campaign_id)
            }))
    }
}

fn token_result(token: MetaTokenResponse) -> TokenResult {
    let mut extra = serde_json::Map::new();
    extra.insert(
        "token_type".into(),
        token.token_type.unwrap_or_else(|| "bearer".into()).into(),
    );

    TokenResult {
        access_token: token.access_token,
        refresh_token: None,
        expires_in_seconds: token.expires_in,
        account_id: None,
        account_name: None,
        extra,
    }
}

//! Google Ads adapter
//!
//! OAuth against Google's authorization server (PKCE supported) and reporting
//! through GAQL `googleAds:search`. Costs arrive in micros and are converted
//! to account currency here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapters::http::{
    Endpoint, build_client, decode_json, lenient_f64, lenient_i64, lenient_id, ratio,
    transport_error, upstream_error,
};
use crate::adapters::{AdPlatformAdapter, AdPlatformMetrics, AdapterMetadata, ReportingAccess, TokenResult};
use crate::config::GoogleAdsConfig;
use crate::date_range::DateRange;
use crate::error::{AppError, AppResult};
use crate::platform::Platform;

pub const GOOGLE_ADS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

const MICROS_PER_UNIT: f64 = 1_000_000.0;
const SEARCH_PAGE_LIMIT: usize = 200;

pub struct GoogleAdsAdapter {
    client_id: String,
    client_secret: String,
    developer_token: Option<String>,
    login_customer_id: Option<String>,
    auth_url: String,
    token_url: String,
    api_base: String,
    api_version: String,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessibleCustomers {
    #[serde(default)]
    resource_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    campaign: CampaignFields,
    #[serde(default)]
    metrics: MetricFields,
    #[serde(default)]
    segments: SegmentFields,
}

#[derive(Debug, Deserialize)]
struct CampaignFields {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricFields {
    #[serde(default, deserialize_with = "lenient_i64")]
    impressions: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    clicks: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    cost_micros: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    conversions: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    conversions_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    ctr: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    average_cpc: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    cost_per_conversion: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentFields {
    date: Option<String>,
}

impl GoogleAdsAdapter {
    pub fn new(config: &GoogleAdsConfig, timeout: Duration) -> AppResult<Self> {
        let (Some(client_id), Some(client_secret)) =
            (config.client_id.clone(), config.client_secret.clone())
        else {
            return Err(AppError::integration("Google Ads client credentials missing"));
        };

        Ok(Self {
            client_id,
            client_secret,
            developer_token: config.developer_token.clone(),
            login_customer_id: config.login_customer_id.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            http_client: build_client(timeout)?,
        })
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> AppResult<GoogleTokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(Platform::GoogleAds, Endpoint::Token, e))?;

        decode_json(Platform::GoogleAds, Endpoint::Token, response).await
    }

    fn with_api_headers(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        let mut request = request.bearer_auth(access_token);
        if let Some(token) = &self.developer_token {
            request = request.header("developer-token", token);
        }
        if let Some(login_customer) = &self.login_customer_id {
            request = request.header("login-customer-id", login_customer);
        }
        request
    }

    /// First customer id the token can see, without dashes.
    async fn list_accessible_customers(&self, access_token: &str) -> AppResult<Option<String>> {
        let url = format!(
            "{}/{}/customers:listAccessibleCustomers",
            self.api_base, self.api_version
        );
        let response = self
            .with_api_headers(self.http_client.get(url), access_token)
            .send()
            .await
            .map_err(|e| transport_error(Platform::GoogleAds, Endpoint::Reporting, e))?;

        let customers: AccessibleCustomers =
            decode_json(Platform::GoogleAds, Endpoint::Reporting, response).await?;

        Ok(customers
            .resource_names
            .first()
            .and_then(|name| name.strip_prefix("customers/"))
            .map(|id| id.replace('-', "")))
    }

    async fn customer_id(&self, access: &ReportingAccess) -> AppResult<String> {
        if let Some(id) = access.account_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.replace('-', ""));
        }
        self.list_accessible_customers(&access.access_token)
            .await?
            .ok_or_else(|| {
                upstream_error(
                    Platform::GoogleAds,
                    Endpoint::Reporting,
                    None,
                    "no accessible Google Ads customer for this connection",
                )
            })
    }

    /// Runs a GAQL query and follows `nextPageToken` until exhausted.
    async fn search(
        &self,
        access_token: &str,
        customer_id: &str,
        query: &str,
    ) -> AppResult<Vec<SearchRow>> {
        let url = format!(
            "{}/{}/customers/{}/googleAds:search",
            self.api_base, self.api_version, customer_id
        );

        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..SEARCH_PAGE_LIMIT {
            let mut body = serde_json::json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = serde_json::Value::String(token.clone());
            }

            let response = self
                .with_api_headers(self.http_client.post(&url), access_token)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(Platform::GoogleAds, Endpoint::Reporting, e))?;

            let page: SearchResponse =
                decode_json(Platform::GoogleAds, Endpoint::Reporting, response).await?;
            rows.extend(page.results);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(rows),
            }
        }

        warn!(customer_id, "Google Ads search stopped at page limit");
        Ok(rows)
    }

    fn normalize(row: SearchRow, fallback_date: NaiveDate) -> AdPlatformMetrics {
        let date = row
            .segments
            .date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .unwrap_or(fallback_date);
        let campaign_id = row.campaign.id.unwrap_or_default();
        let campaign_name = row
            .campaign
            .name
            .unwrap_or_else(|| campaign_id.clone());

        let metrics = row.metrics;
        let spend = metrics.cost_micros.map(|micros| micros as f64 / MICROS_PER_UNIT);
        let clicks = metrics.clicks;
        let impressions = metrics.impressions;

        let mut record =
            AdPlatformMetrics::new(Platform::GoogleAds, date, campaign_id, campaign_name);
        record.spend = spend;
        record.impressions = impressions;
        record.clicks = clicks;
        record.conversions = metrics.conversions;
        record.conversion_value = metrics.conversions_value;
        record.ctr = metrics.ctr;
        record.cpc = metrics.average_cpc.map(|micros| micros / MICROS_PER_UNIT);
        record.cost_per_conversion = metrics
            .cost_per_conversion
            .map(|micros| micros / MICROS_PER_UNIT);
        record.conversion_rate = ratio(metrics.conversions, clicks.map(|c| c as f64));
        record.roas = ratio(metrics.conversions_value, spend);
        record
    }
}

fn gaql_metrics_query(range: DateRange, campaign_id: Option<&str>, by_day: bool) -> String {
    let mut select = String::from(
        "SELECT campaign.id, campaign.name, metrics.impressions, metrics.clicks, \
         metrics.cost_micros, metrics.conversions, metrics.conversions_value, \
         metrics.ctr, metrics.average_cpc, metrics.cost_per_conversion",
    );
    if by_day {
        select.push_str(", segments.date");
    }

    let mut query = format!(
        "{select} FROM campaign WHERE segments.date BETWEEN '{}' AND '{}'",
        range.start.format("%Y-%m-%d"),
        range.end.format("%Y-%m-%d")
    );
    if let Some(id) = campaign_id {
        query.push_str(&format!(" AND campaign.id = {id}"));
    }
    if by_day {
        query.push_str(" ORDER BY segments.date ASC");
    }
    query
}

#[async_trait]
impl AdPlatformAdapter for GoogleAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::GoogleAds
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata::new(Platform::GoogleAds, &[GOOGLE_ADS_SCOPE], true)
    }

    fn generate_auth_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> AppResult<Url> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| AppError::integration(format!("invalid Google auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_ADS_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
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
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<TokenResult> {
        let mut form = vec![
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let token = self.post_token_form(&form).await?;
        info!(platform = %Platform::GoogleAds, "Exchanged authorization code");

        // Account lookup needs a developer token; without one the connection simply has no account yet
        let account_id = if self.developer_token.is_some() {
            match self.list_accessible_customers(&token.access_token).await {
                Ok(account) => account,
                Err(err) => {
                    warn!(error = %err, "Google Ads customer lookup failed; continuing without account");
                    None
                }
            }
        } else {
            debug!("Skipping Google Ads customer lookup: no developer token configured");
            None
        };

        Ok(token_result(token, account_id))
    }

    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResult> {
        let form = [
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let token = self.post_token_form(&form).await?;
        Ok(token_result(token, None))
    }

    async fn fetch_campaign_metrics(
        &self,
        access: &ReportingAccess,
        range: DateRange,
    ) -> AppResult<Vec<AdPlatformMetrics>> {
        let customer_id = self.customer_id(access).await?;
        let query = gaql_metrics_query(range, None, true);
        let rows = self
            .search(&access.access_token, &customer_id, &query)
            .await?;

        debug!(customer_id = %customer_id, rows = rows.len(), "Fetched Google Ads metrics");
        Ok(rows
            .into_iter()
            .map(|row| Self::normalize(row, range.start))
            .collect())
    }

    async fn fetch_campaign_details(
        &self,
        access: &ReportingAccess,
        campaign_id: &str,
        range: DateRange,
    ) -> AppResult<AdPlatformMetrics> {
        if campaign_id.is_empty() || !campaign_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::validation(
                "campaignId",
                "Google Ads campaign ids are numeric",
            ));
        }

        let customer_id = self.customer_id(access).await?;
        let query = gaql_metrics_query(range, Some(campaign_id), false);
        let rows = self
            .search(&access.access_token, &customer_id, &query)
            .await?;

        match rows.into_iter().next() {
            Some(row) => {
                let mut record = Self::normalize(row, range.start);
                record.date = range.start;
                Ok(record)
            }
            None => Ok(AdPlatformMetrics::new(
                Platform::GoogleAds,
                range.start,
                campaign_id,
                campaign_id,
            )),
        }
    }
}

fn token_result(token: GoogleTokenResponse, account_id: Option<String>) -> TokenResult {
    let mut extra = serde_json::Map::new();
    if let Some(token_type) = token.token_type {
        extra.insert("token_type".into(), token_type.into());
    }
    if let Some(scope) = token.scope {
        extra.insert("scope".into(), scope.into());
    }

    TokenResult {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_in_seconds: token.expires_in,
        account_id,
        account_name: None,
        extra,
    }
}

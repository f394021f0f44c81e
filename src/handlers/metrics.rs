//! # Metrics Handlers
//!
//! Read-only analytics views over stored campaign metrics, plus the endpoint
//! that kicks off ingestion from the connected platforms.

use axum::{
    body::Bytes,
    extract::State,
    response::Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::aggregation::{
    MetricInsight, MetricSummary, PerformanceTimeseriesPoint, PlatformPerformance,
    SpendDistribution, TopCampaign,
};
use crate::auth::CurrentUser;
use crate::date_range::{DEFAULT_WINDOW_DAYS, DateRange};
use crate::error::{ApiError, AppError};
use crate::handlers::types::{ApiQuery, MetricsQuery, SuccessResponse};
use crate::platform::Platform;
use crate::server::AppState;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Totals and period-over-period changes
#[utoipa::path(
    get,
    path = "/api/metrics/summary",
    security(("session" = [])),
    params(MetricsQuery),
    responses(
        (status = 200, description = "Metrics summary", body = MetricSummary),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn summary(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Json<MetricSummary>, ApiError> {
    let range = query.range(today())?;
    let summary = state
        .aggregation
        .get_metrics_summary(user_id, range, query.platform()?)
        .await?;
    Ok(Json(summary))
}

/// Per-platform performance, including connected platforms without data
#[utoipa::path(
    get,
    path = "/api/metrics/platforms",
    security(("session" = [])),
    params(MetricsQuery),
    responses(
        (status = 200, description = "Performance per platform", body = [PlatformPerformance]),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn platforms(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Json<Vec<PlatformPerformance>>, ApiError> {
    let range = query.range(today())?;
    Ok(Json(
        state
            .aggregation
            .get_platform_performance(user_id, range)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/metrics/spend-distribution",
    security(("session" = [])),
    params(MetricsQuery),
    responses(
        (status = 200, description = "Share of spend per platform", body = [SpendDistribution]),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn spend_distribution(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Json<Vec<SpendDistribution>>, ApiError> {
    let range = query.range(today())?;
    Ok(Json(
        state
            .aggregation
            .get_spend_distribution(user_id, range)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/metrics/top-campaigns",
    security(("session" = [])),
    params(MetricsQuery),
    responses(
        (status = 200, description = "Campaigns ranked by ROAS", body = [TopCampaign]),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn top_campaigns(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Json<Vec<TopCampaign>>, ApiError> {
    let range = query.range(today())?;
    let campaigns = state
        .aggregation
        .get_top_campaigns(user_id, range, query.limit()?, query.platform()?)
        .await?;
    Ok(Json(campaigns))
}

/// One point per day for the requested metric
#[utoipa::path(
    get,
    path = "/api/metrics/performance",
    security(("session" = [])),
    params(MetricsQuery),
    responses(
        (status = 200, description = "Daily timeseries", body = [PerformanceTimeseriesPoint]),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn performance(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Json<Vec<PerformanceTimeseriesPoint>>, ApiError> {
    let range = query.range(today())?;
    let points = state
        .aggregation
        .get_performance_timeseries(user_id, range, query.metric()?, query.platform()?)
        .await?;
    Ok(Json(points))
}

#[utoipa::path(
    get,
    path = "/api/metrics/insights",
    security(("session" = [])),
    responses(
        (status = 200, description = "Newest insights first", body = [MetricInsight]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn insights(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<MetricInsight>>, ApiError> {
    Ok(Json(
        state
            .aggregation
            .get_metric_insights(user_id, today())
            .await?,
    ))
}

/// Optional body of `POST /metrics/fetch`
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FetchRequest {
    /// Only sync this platform
    pub platform: Option<String>,
}

/// Start syncing the last 30 days from the connected platforms
///
/// Returns immediately; the sync runs in the background.
#[utoipa::path(
    post,
    path = "/api/metrics/fetch",
    security(("session" = [])),
    request_body(content = FetchRequest, description = "May be omitted", content_type = "application/json"),
    responses(
        (status = 200, description = "Fetch started", body = SuccessResponse),
        (status = 400, description = "Invalid platform", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn fetch(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request: FetchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FetchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::validation("body", format!("invalid JSON: {e}")))?
    };
    let platform = request
        .platform
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(str::parse::<Platform>)
        .transpose()?;

    let range = DateRange::last_days(today(), DEFAULT_WINDOW_DAYS);
    let sync = state.sync.clone();
    tokio::spawn(async move {
        match sync.sync_user(user_id, platform, range).await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|o| !o.is_success()).count();
                tracing::info!(%user_id, platforms = outcomes.len(), failed, "Metrics fetch finished");
            }
            Err(error) => {
                tracing::error!(%user_id, error = %error, "Metrics fetch failed");
            }
        }
    });

    Ok(Json(SuccessResponse::with_message("Data fetch initiated")))
}

//! # Common API Types
//!
//! Query parameters shared by the metrics endpoints and the small response
//! bodies several handlers return.

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::{IntoParams, ToSchema};

use crate::aggregation::{DEFAULT_TOP_CAMPAIGNS, TimeseriesMetric};
use crate::date_range::{DEFAULT_WINDOW_DAYS, DateRange, MAX_SPAN_DAYS};
use crate::error::{ApiError, AppError, AppResult};
use crate::platform::Platform;

/// [`Query`] that rejects with a problem+json 400 instead of plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Query parameters accepted by the `/metrics/*` views
///
/// Values are taken as strings so malformed input surfaces as a
/// field-level validation error instead of a generic query rejection.
#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MetricsQuery {
    /// `YYYY-MM-DD` or RFC 3339 (default: 30 days before `endDate`)
    pub start_date: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339 (default: today, UTC)
    pub end_date: Option<String>,
    /// Restrict to one platform, e.g. `google_ads`
    pub platform: Option<String>,
    /// Top campaigns only, 1..=100 (default 5)
    pub limit: Option<String>,
    /// Performance only: spend, roas, conversions or ctr (default spend)
    pub metric: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a calendar date, truncating RFC 3339 timestamps to their date.
pub fn parse_date(field: &'static str, value: &str) -> AppResult<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.date_naive())
        .map_err(|_| AppError::validation(field, format!("'{value}' is not a valid date")))
}

impl MetricsQuery {
    /// The requested window; defaults to the 30 days ending `today`.
    pub fn range(&self, today: NaiveDate) -> AppResult<DateRange> {
        let end = present(&self.end_date)
            .map(|value| parse_date("endDate", value))
            .transpose()?
            .unwrap_or(today);
        let start = present(&self.start_date)
            .map(|value| parse_date("startDate", value))
            .transpose()?
            .unwrap_or_else(|| DateRange::last_days(end, DEFAULT_WINDOW_DAYS).start);

        let range = DateRange::new(start, end)?;
        if range.day_count() > MAX_SPAN_DAYS {
            return Err(AppError::validation(
                "endDate",
                format!("date range may span at most {MAX_SPAN_DAYS} days"),
            ));
        }
        Ok(range)
    }

    pub fn platform(&self) -> AppResult<Option<Platform>> {
        present(&self.platform).map(str::parse).transpose()
    }

    pub fn metric(&self) -> AppResult<TimeseriesMetric> {
        Ok(present(&self.metric)
            .map(str::parse)
            .transpose()?
            .unwrap_or_default())
    }

    /// Parsed `limit`; range checks happen in the aggregation engine.
    pub fn limit(&self) -> AppResult<u64> {
        match present(&self.limit) {
            None => Ok(DEFAULT_TOP_CAMPAIGNS),
            Some(value) => value
                .parse()
                .map_err(|_| AppError::validation("limit", format!("'{value}' is not a number"))),
        }
    }
}

/// Generic acknowledgement body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
        }
    }
}

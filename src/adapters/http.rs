//! HTTP plumbing shared by the platform adapters: client construction,
//! upstream error decoding, and lenient number parsing for reporting payloads.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::{AppError, AppResult};
use crate::platform::Platform;

const MAX_MESSAGE_CHARS: usize = 300;

/// Which kind of endpoint a request went to; decides the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// OAuth token endpoint (exchange, refresh)
    Token,
    /// Reporting or account API
    Reporting,
}

pub(crate) fn build_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("campaigniq/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::integration(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn upstream_error(
    platform: Platform,
    endpoint: Endpoint,
    http_status: Option<u16>,
    platform_message: impl Into<String>,
) -> AppError {
    let platform_message = platform_message.into();
    match endpoint {
        Endpoint::Token => AppError::OAuthExchange {
            platform,
            http_status,
            platform_message,
        },
        Endpoint::Reporting => AppError::PlatformApi {
            platform,
            http_status,
            platform_message,
        },
    }
}

/// Map a transport failure (connect, timeout, TLS) to the endpoint's error type.
pub(crate) fn transport_error(
    platform: Platform,
    endpoint: Endpoint,
    error: reqwest::Error,
) -> AppError {
    let status = error.status().map(|s| s.as_u16());
    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "could not connect".to_string()
    } else {
        format!("request failed: {}", error.without_url())
    };
    upstream_error(platform, endpoint, status, message)
}

/// Read the body, fail on non-2xx with the platform's own message, else decode JSON.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    platform: Platform,
    endpoint: Endpoint,
    response: Response,
) -> AppResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(platform, endpoint, e))?;

    if !status.is_success() {
        return Err(upstream_error(
            platform,
            endpoint,
            Some(status.as_u16()),
            platform_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            }),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        upstream_error(
            platform,
            endpoint,
            Some(status.as_u16()),
            format!("malformed response: {e}"),
        )
    })
}

/// Extract a human-readable message from an upstream error body.
///
/// Understands `error_description`, `error.message`, a bare `error` string,
/// and a top-level `message` (the TikTok envelope).
pub(crate) fn platform_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let message = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) => json
            .get("error_description")
            .and_then(|v| v.as_str())
            .or_else(|| {
                json.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
            })
            .or_else(|| json.get("error").and_then(|v| v.as_str()))
            .or_else(|| json.get("message").and_then(|v| v.as_str()))
            .map(str::to_string),
        Err(_) => None,
    }
    .unwrap_or_else(|| trimmed.to_string());

    Some(truncate(message))
}

fn truncate(message: String) -> String {
    if message.chars().count() > MAX_MESSAGE_CHARS {
        let cut: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{cut}...")
    } else {
        message
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts `12.5`, `"12.5"`, `null` or a missing field. Unparseable text becomes `None`.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<LenientNumber>::deserialize(deserializer)?.and_then(|value| match value {
            LenientNumber::Int(v) => Some(v as f64),
            LenientNumber::Float(v) => Some(v),
            LenientNumber::Text(text) => text.trim().parse::<f64>().ok(),
        }),
    )
}

/// Integer counterpart of [`lenient_f64`]; fractional values are truncated.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<LenientNumber>::deserialize(deserializer)?.and_then(|value| match value {
            LenientNumber::Int(v) => Some(v),
            LenientNumber::Float(v) => Some(v as i64),
            LenientNumber::Text(text) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|v| v as i64))
            }
        }),
    )
}

/// Accepts an id sent either as a JSON number or a string.
pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<LenientNumber>::deserialize(deserializer)?.map(|value| match value {
            LenientNumber::Int(v) => v.to_string(),
            LenientNumber::Float(v) => format!("{v}"),
            LenientNumber::Text(text) => text,
        }),
    )
}

/// `numerator / denominator` when both are present and the denominator is positive.
pub(crate) fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Some(n / d),
        _ => None,
    }
}

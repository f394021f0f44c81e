//! # Error Handling
//!
//! Domain errors ([`AppError`]) raised by the token store, OAuth flow, adapters
//! and aggregation engine, plus the problem+json [`ApiError`] the HTTP layer
//! renders them as.

use axum::{
    extract::rejection::QueryRejection,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::crypto::CryptoError;
use crate::platform::Platform;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Trace id of the active request, or a generated correlation id outside one.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Typed failures of the connection lifecycle and analytics core.
#[derive(Debug, Error)]
pub enum AppError {
    /// The platform's token endpoint rejected a code or refresh token.
    #[error("{platform} token exchange failed: {platform_message}")]
    OAuthExchange {
        platform: Platform,
        http_status: Option<u16>,
        platform_message: String,
    },
    /// The adapter does not implement this capability.
    #[error("{operation} is not supported for {platform}")]
    UnsupportedOperation {
        platform: Platform,
        operation: &'static str,
    },
    /// Storage or crypto failure. The message is logged, never returned to clients.
    #[error("integration error: {0}")]
    Integration(String),
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    /// Stored grant is unusable and the user has to authorize again.
    #[error("{platform} connection requires re-authorization: {reason}")]
    ReconnectRequired { platform: Platform, reason: String },
    /// A reporting call to the platform failed.
    #[error("{platform} API request failed: {platform_message}")]
    PlatformApi {
        platform: Platform,
        http_status: Option<u16>,
        platform_message: String,
    },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn integration(message: impl std::fmt::Display) -> Self {
        Self::Integration(message.to_string())
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(error: sea_orm::DbErr) -> Self {
        AppError::Integration(error.to_string())
    }
}

impl From<CryptoError> for AppError {
    fn from(error: CryptoError) -> Self {
        AppError::Integration(error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<AppError>() {
            Ok(app_error) => app_error,
            Err(error) => AppError::Integration(format!("{error:#}")),
        }
    }
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Not Found")]
    NotFound,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Upstream platform error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Platform identifier (e.g., "google_ads")
    pub provider: String,
    /// HTTP status code from upstream, when the failure came with one
    pub status: Option<u16>,
    /// Platform-supplied message (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, axum::Json(&self)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation { field, message } => {
                validation_error(&format!("Invalid {field}"), json!({ field: message }))
            }
            AppError::OAuthExchange {
                platform,
                http_status,
                platform_message,
            } => {
                tracing::warn!(%platform, ?http_status, "OAuth exchange rejected");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "OAUTH_EXCHANGE_FAILED",
                    &format!("Connection to {} failed; please authorize again", platform),
                )
                .with_details(json!(ProviderError {
                    provider: platform.to_string(),
                    status: http_status,
                    body_snippet: Some(truncate_snippet(platform_message)),
                }))
            }
            AppError::PlatformApi {
                platform,
                http_status,
                platform_message,
            } => provider_error(platform.to_string(), http_status, Some(platform_message)),
            AppError::UnsupportedOperation {
                platform,
                operation,
            } => ApiError::new(
                StatusCode::NOT_IMPLEMENTED,
                "UNSUPPORTED_OPERATION",
                &format!("{} is not supported for {}", operation, platform),
            ),
            AppError::ReconnectRequired { platform, reason } => {
                tracing::info!(%platform, %reason, "Connection requires re-authorization");
                ApiError::new(
                    StatusCode::CONFLICT,
                    "RECONNECT_REQUIRED",
                    &format!("Reconnect {} to continue", platform),
                )
                .with_details(json!({ "platform": platform }))
            }
            AppError::Integration(message) => {
                tracing::error!(error = %message, "Integration error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
        }
    }
}

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("Invalid query string: {}", rejection.body_text()),
        )
    }
}

fn truncate_snippet(body: String) -> String {
    if body.chars().count() > 200 {
        let truncated: String = body.chars().take(200).collect();
        format!("{}...", truncated)
    } else {
        body
    }
}

/// Create a platform upstream error. Every upstream failure maps to 502.
pub fn provider_error(provider: String, status: Option<u16>, body: Option<String>) -> ApiError {
    let message = match status {
        Some(code) => format!("Platform {} returned error status {}", provider, code),
        None => format!("Platform {} request failed", provider),
    };
    let provider_error = ProviderError {
        provider,
        status,
        body_snippet: body.map(truncate_snippet),
    };

    ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &message)
        .with_details(json!(provider_error))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Unauthorized");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_unauthorized_default_message() {
        let error = unauthorized(None);
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(error.message, Box::from("Unauthorized"));
    }

    #[test]
    fn test_validation_maps_to_400_with_field() {
        let api: ApiError = AppError::validation("platform", "unknown platform 'myspace'").into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, Box::from("VALIDATION_FAILED"));
        let details = api.details.unwrap();
        assert_eq!(details["platform"], "unknown platform 'myspace'");
    }

    #[test]
    fn test_oauth_exchange_maps_to_502_with_status() {
        let api: ApiError = AppError::OAuthExchange {
            platform: Platform::GoogleAds,
            http_status: Some(400),
            platform_message: "invalid_grant".into(),
        }
        .into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.code, Box::from("OAUTH_EXCHANGE_FAILED"));
        let details = api.details.unwrap();
        assert_eq!(details["provider"], "google_ads");
        assert_eq!(details["status"], 400);
    }

    #[test]
    fn test_reconnect_required_is_distinguishable() {
        let api: ApiError = AppError::ReconnectRequired {
            platform: Platform::TiktokAds,
            reason: "refresh rejected".into(),
        }
        .into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, Box::from("RECONNECT_REQUIRED"));
        assert_eq!(api.details.unwrap()["platform"], "tiktok_ads");
    }

    #[test]
    fn test_unsupported_operation_maps_to_501() {
        let api: ApiError = AppError::UnsupportedOperation {
            platform: Platform::TiktokAds,
            operation: "fetch_campaign_details",
        }
        .into();
        assert_eq!(api.status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(api.code, Box::from("UNSUPPORTED_OPERATION"));
    }

    #[test]
    fn test_integration_error_hides_detail() {
        let api: ApiError =
            AppError::Integration("connection refused at 10.0.0.4:5432".into()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("10.0.0.4"));
    }

    #[test]
    fn test_db_error_becomes_integration() {
        let app: AppError = sea_orm::DbErr::Custom("disk full".into()).into();
        assert!(matches!(app, AppError::Integration(_)));
        assert_eq!(ApiError::from(app).status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_provider_error_truncates_utf8_safely() {
        let body = "ÄÖÜ ".repeat(100);
        let error = provider_error("facebook_ads".into(), Some(500), Some(body));
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        let details = error.details.unwrap();
        let snippet = details["body_snippet"].as_str().unwrap();
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().count() <= 203);
    }

    #[test]
    fn test_problem_json_content_type() {
        let response = ApiError::from(ErrorType::ServiceUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_error_type_mapping() {
        let not_found: ApiError = ErrorType::NotFound.into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.code, Box::from("NOT_FOUND"));
    }
}

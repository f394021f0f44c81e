//! # Platform Connection Handlers
//!
//! Listing, connecting, refreshing and disconnecting a user's ad platform
//! connections. Token columns never leave the server.

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiError, AppError};
use crate::handlers::types::{ApiQuery, SuccessResponse};
use crate::models::platform_connection;
use crate::platform::Platform;
use crate::server::AppState;

/// A stored connection as the dashboard sees it
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub platform: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// `expiresAt` has passed and no refresh happened yet
    pub is_expired: bool,
    pub has_refresh_token: bool,
    /// Platform-specific data from the token response, without secrets
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn from_model(model: platform_connection::Model, now: DateTime<Utc>) -> Self {
        let expires_at = model.expires_at.map(|at| at.with_timezone(&Utc));
        Self {
            id: model.id,
            platform: model.platform,
            account_id: model.account_id,
            account_name: model.account_name,
            is_expired: expires_at.is_some_and(|at| at <= now),
            expires_at,
            has_refresh_token: model.refresh_token_ciphertext.is_some(),
            metadata: model.metadata,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// A platform this server can connect to
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePlatform {
    pub platform: Platform,
    pub display_name: String,
    pub supports_pkce: bool,
    pub supports_campaign_details: bool,
    pub is_connected: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConnectQuery {
    /// base64url(SHA-256(verifier)) computed by the client
    pub code_challenge: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    /// Where to send the browser to grant access
    pub auth_url: String,
}

/// Parameters the platform appends when redirecting back
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub code_verifier: Option<String>,
    /// Set by the platform when the user declined
    pub error: Option<String>,
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    raw.parse::<Platform>().map_err(ApiError::from)
}

/// List the current user's connections
#[utoipa::path(
    get,
    path = "/api/platforms",
    security(("session" = [])),
    responses(
        (status = 200, description = "Connections of the current user", body = [ConnectionInfo]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn list_connections(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<ConnectionInfo>>, ApiError> {
    let now = Utc::now();
    let connections = state
        .connections
        .list_connections(user_id)
        .await
        .map_err(AppError::from)?;

    Ok(Json(
        connections
            .into_iter()
            .map(|model| ConnectionInfo::from_model(model, now))
            .collect(),
    ))
}

/// List the platforms enabled on this server
#[utoipa::path(
    get,
    path = "/api/platforms/available",
    security(("session" = [])),
    responses(
        (status = 200, description = "Registered platform adapters", body = [AvailablePlatform]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn list_available(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<AvailablePlatform>>, ApiError> {
    let connected: Vec<String> = state
        .connections
        .list_connections(user_id)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(|connection| connection.platform)
        .collect();

    Ok(Json(
        state
            .registry
            .list_metadata()
            .into_iter()
            .map(|metadata| AvailablePlatform {
                is_connected: connected.iter().any(|p| p == metadata.platform.as_str()),
                platform: metadata.platform,
                display_name: metadata.display_name,
                supports_pkce: metadata.supports_pkce,
                supports_campaign_details: metadata.supports_campaign_details,
            })
            .collect(),
    ))
}

/// Start an OAuth authorization for a platform
#[utoipa::path(
    get,
    path = "/api/platforms/connect/{platform}",
    security(("session" = [])),
    params(
        ("platform" = String, Path, description = "Platform identifier, e.g. 'google_ads'"),
        ConnectQuery
    ),
    responses(
        (status = 200, description = "Authorization URL", body = AuthUrlResponse),
        (status = 400, description = "Unknown or disabled platform", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn connect(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(platform): Path<String>,
    ApiQuery(query): ApiQuery<ConnectQuery>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let platform = parse_platform(&platform)?;
    let challenge = query.code_challenge.as_deref().filter(|c| !c.is_empty());

    let start = state
        .oauth
        .begin_authorization(user_id, platform, challenge)
        .await?;

    Ok(Json(AuthUrlResponse {
        auth_url: start.auth_url.to_string(),
    }))
}

pub(crate) fn redirect_to_frontend(base: &str, outcome: &str) -> Response {
    let location = format!("{}/?{}=true", base.trim_end_matches('/'), outcome);
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// Finish an OAuth authorization and send the browser back to the dashboard
#[utoipa::path(
    get,
    path = "/api/platforms/callback/{platform}",
    security(("session" = [])),
    params(
        ("platform" = String, Path, description = "Platform identifier"),
        CallbackQuery
    ),
    responses(
        (status = 302, description = "Redirect with connection_success=true or connection_error=true"),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn callback(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(platform): Path<String>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Response {
    let frontend = &state.config.frontend_base_url;

    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::warn!(%user_id, platform = %platform, error = %rejection.body_text(), "Malformed callback query");
            return redirect_to_frontend(frontend, "connection_error");
        }
    };

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(%user_id, platform = %platform, error, "Platform returned an authorization error");
        return redirect_to_frontend(frontend, "connection_error");
    }

    let platform = match platform.parse::<Platform>() {
        Ok(platform) => platform,
        Err(error) => {
            tracing::warn!(%user_id, error = %error, "Callback for unknown platform");
            return redirect_to_frontend(frontend, "connection_error");
        }
    };

    let result = state
        .oauth
        .complete_authorization(
            user_id,
            platform,
            query.code.as_deref().unwrap_or_default(),
            query.state.as_deref().unwrap_or_default(),
            query.code_verifier.as_deref(),
        )
        .await;

    match result {
        Ok(connection) => {
            tracing::info!(%user_id, %platform, connection_id = %connection.id, "Platform connected");
            redirect_to_frontend(frontend, "connection_success")
        }
        Err(error) => {
            tracing::warn!(%user_id, %platform, error = %error, "Platform connection failed");
            redirect_to_frontend(frontend, "connection_error")
        }
    }
}

/// Remove the connection for a platform
#[utoipa::path(
    delete,
    path = "/api/platforms/{platform}",
    security(("session" = [])),
    params(("platform" = String, Path, description = "Platform identifier")),
    responses(
        (status = 200, description = "Connection removed", body = SuccessResponse),
        (status = 400, description = "Unknown platform", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(platform): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let platform = parse_platform(&platform)?;
    let deleted = state
        .connections
        .delete_connection(user_id, platform)
        .await
        .map_err(AppError::from)?;

    if deleted {
        tracing::info!(%user_id, %platform, "Platform disconnected");
    } else {
        tracing::debug!(%user_id, %platform, "Disconnect for a platform that was not connected");
    }
    Ok(Json(SuccessResponse::ok()))
}

/// Refresh a connection's access token now
#[utoipa::path(
    post,
    path = "/api/platforms/{platform}/refresh",
    security(("session" = [])),
    params(("platform" = String, Path, description = "Platform identifier")),
    responses(
        (status = 200, description = "Refreshed connection", body = ConnectionInfo),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "The platform must be authorized again", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn refresh(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(platform): Path<String>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let platform = parse_platform(&platform)?;
    let connection = state.token_refresh.force_refresh(user_id, platform).await?;
    Ok(Json(ConnectionInfo::from_model(connection, Utc::now())))
}

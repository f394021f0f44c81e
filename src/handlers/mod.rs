//! # API Handlers
//!
//! HTTP endpoint handlers for the CampaignIQ API. Everything except
//! [`health`] runs behind the session middleware.

use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::{ApiError, AppError, ErrorType};
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod metrics;
pub mod platforms;
pub mod types;

/// Liveness plus a database round-trip
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = ServiceInfo),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    if let Err(error) = db::health_check(&state.db).await {
        tracing::error!(error = %error, "Health check failed");
        return Err(ErrorType::ServiceUnavailable.into());
    }
    Ok(Json(ServiceInfo::with_status("ok")))
}

/// Profile of the signed-in user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/user",
    security(("session" = [])),
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "User no longer exists", body = ApiError)
    ),
    tag = "user"
)]
pub async fn current_user(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .users
        .get(user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| ApiError::from(ErrorType::NotFound))?;

    Ok(Json(UserProfile {
        id: user.id,
        email: user.email,
        name: user.name,
        avatar_url: user.avatar_url,
        created_at: user.created_at.with_timezone(&Utc),
    }))
}

//! # Session Authentication
//!
//! Every `/api` route except health runs behind [`auth_middleware`], which
//! accepts an HS256 session JWT from `Authorization: Bearer` or from the
//! session cookie and injects the [`CurrentUser`] for handlers.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, AppError, AppResult, unauthorized};
use crate::server::AppState;

/// Lifetime of tokens minted by `seed-demo`
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// JWT claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated user of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

fn session_secret(config: &AppConfig) -> Option<&[u8]> {
    config.session_secret.as_deref().map(str::as_bytes)
}

/// Mint a session token for `user_id` valid for `ttl`.
pub fn issue_session_token(config: &AppConfig, user_id: Uuid, ttl: Duration) -> AppResult<String> {
    let secret = session_secret(config)
        .ok_or_else(|| AppError::integration("session secret is not configured"))?;
    let now = Utc::now();
    let claims = SessionClaims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(AppError::integration)
}

/// Verify signature and expiry, returning the user id in `sub`.
pub fn verify_session_token(config: &AppConfig, token: &str) -> Option<Uuid> {
    let secret = session_secret(config)?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    match decode::<SessionClaims>(token, &DecodingKey::from_secret(secret), &validation) {
        Ok(data) => data.claims.sub.parse().ok(),
        Err(error) => {
            tracing::debug!(error = %error, "Rejected session token");
            None
        }
    }
}

/// Bearer token first, then the named session cookie.
fn extract_session_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(bearer.trim());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
}

/// Authenticates the request and injects [`CurrentUser`]
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = extract_session_token(request.headers(), &config.session_cookie_name)
        .and_then(|token| verify_session_token(&config, token))
        .ok_or_else(|| unauthorized(None))?;

    tracing::debug!(%user_id, "Authenticated session");
    request.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or_else(|| unauthorized(None))
    }
}

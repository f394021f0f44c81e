//! # OAuth Flow Manager
//!
//! Drives the authorize → callback → exchange handshake for every platform
//! through the adapter registry. The pending state (and the PKCE verifier when
//! the server generated it) is kept in the oauth state store until the
//! callback consumes it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::counter;
use serde_json::Value as JsonValue;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, TokenResult};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::platform_connection;
use crate::pkce;
use crate::platform::Platform;
use crate::repositories::{
    ConnectionCandidate, ConnectionRepository, OAuthStateRepository, PendingAuthorization,
};

/// Outcome of the connect step.
#[derive(Debug, Clone)]
pub struct AuthorizationStart {
    pub auth_url: Url,
    pub state: String,
}

#[derive(Clone)]
pub struct OAuthFlowManager {
    registry: Arc<AdapterRegistry>,
    states: OAuthStateRepository,
    connections: Arc<ConnectionRepository>,
    redirect_uri_base: String,
    verifier_length: usize,
    state_ttl: Duration,
}

impl OAuthFlowManager {
    pub fn new(
        config: &AppConfig,
        registry: Arc<AdapterRegistry>,
        states: OAuthStateRepository,
        connections: Arc<ConnectionRepository>,
    ) -> Self {
        Self {
            registry,
            states,
            connections,
            redirect_uri_base: config.redirect_uri_base.trim_end_matches('/').to_string(),
            verifier_length: config.pkce_verifier_length,
            state_ttl: Duration::seconds(config.oauth_state_ttl_seconds as i64),
        }
    }

    /// Redirect URI registered with every platform for `platform`.
    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!(
            "{}/api/platforms/callback/{}",
            self.redirect_uri_base, platform
        )
    }

    /// Start an authorization: persist the pending state and build the URL.
    ///
    /// A client-supplied challenge is forwarded as-is (the client keeps the
    /// verifier). Without one, a PKCE platform gets a server-side verifier.
    #[instrument(skip_all, fields(%user_id, %platform))]
    pub async fn begin_authorization(
        &self,
        user_id: Uuid,
        platform: Platform,
        client_code_challenge: Option<&str>,
    ) -> AppResult<AuthorizationStart> {
        let adapter = self.registry.get(platform)?;
        let state = pkce::generate_secure_state();
        let client_code_challenge = client_code_challenge.filter(|c| !c.trim().is_empty());

        let (challenge, pending) = if adapter.metadata().supports_pkce {
            match client_code_challenge {
                Some(challenge) => (
                    Some(challenge.to_string()),
                    PendingAuthorization {
                        state: state.clone(),
                        code_verifier: None,
                        client_pkce: true,
                    },
                ),
                None => {
                    let verifier = pkce::generate_code_verifier(self.verifier_length);
                    (
                        Some(pkce::code_challenge(&verifier)),
                        PendingAuthorization {
                            state: state.clone(),
                            code_verifier: Some(verifier),
                            client_pkce: false,
                        },
                    )
                }
            }
        } else {
            (
                None,
                PendingAuthorization {
                    state: state.clone(),
                    code_verifier: None,
                    client_pkce: false,
                },
            )
        };

        let client_pkce = pending.client_pkce;
        let auth_url = adapter.generate_auth_url(
            &self.redirect_uri(platform),
            &state,
            challenge.as_deref(),
        )?;

        self.states
            .create_or_replace(user_id, platform, pending, self.state_ttl)
            .await?;

        counter!("oauth_authorizations_started_total", "platform" => platform.as_str())
            .increment(1);
        info!(client_pkce, "OAuth authorization started");

        Ok(AuthorizationStart { auth_url, state })
    }

    /// Finish an authorization from the callback's query.
    ///
    /// The pending entry is consumed before the exchange, so a failed exchange
    /// cannot be replayed with the same state.
    #[instrument(skip_all, fields(%user_id, %platform))]
    pub async fn complete_authorization(
        &self,
        user_id: Uuid,
        platform: Platform,
        code: &str,
        state: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<platform_connection::Model> {
        let adapter = self.registry.get(platform)?;
        if code.trim().is_empty() {
            return Err(AppError::validation("code", "authorization code is missing"));
        }

        let pending = self
            .states
            .find_and_consume(user_id, platform)
            .await?
            .ok_or_else(|| AppError::validation("state", "no pending authorization"))?;

        if pending.expires_at.with_timezone(&Utc) <= Utc::now() {
            return Err(AppError::validation("state", "authorization has expired"));
        }
        if !bool::from(pending.state.as_bytes().ct_eq(state.as_bytes())) {
            warn!("OAuth state mismatch");
            return Err(AppError::validation("state", "state does not match"));
        }

        let code_verifier = if adapter.metadata().supports_pkce {
            let verifier = code_verifier
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or(pending.code_verifier);
            if verifier.is_none() && pending.client_pkce {
                return Err(AppError::validation(
                    "code_verifier",
                    "code_verifier is required for this authorization",
                ));
            }
            verifier
        } else {
            None
        };

        let tokens = match adapter
            .exchange_code(code, &self.redirect_uri(platform), code_verifier.as_deref())
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                counter!("oauth_exchanges_total", "platform" => platform.as_str(), "outcome" => "failure")
                    .increment(1);
                return Err(err);
            }
        };

        let connection = self
            .connections
            .upsert_connection(candidate_from_tokens(user_id, platform, tokens, true))
            .await?;

        counter!("oauth_exchanges_total", "platform" => platform.as_str(), "outcome" => "success")
            .increment(1);
        info!(connection_id = %connection.id, "Platform connected");
        Ok(connection)
    }

    pub async fn refresh_token(&self, platform: Platform, refresh_token: &str) -> AppResult<TokenResult> {
        self.registry.get(platform)?.refresh_token(refresh_token).await
    }

    /// Delete pending authorizations past their TTL.
    pub async fn purge_expired_states(&self) -> AppResult<u64> {
        Ok(self.states.cleanup_expired(Utc::now()).await?)
    }
}

/// Convert a token response into an upsert candidate.
///
/// `with_metadata` replaces the stored metadata with the response's non-secret
/// fields; refreshes pass `false` so the exchange-time metadata survives.
pub(crate) fn candidate_from_tokens(
    user_id: Uuid,
    platform: Platform,
    tokens: TokenResult,
    with_metadata: bool,
) -> ConnectionCandidate {
    let expires_at = tokens.expires_at(Utc::now());
    let metadata = with_metadata.then(|| JsonValue::Object(tokens.extra.clone()));

    ConnectionCandidate {
        user_id,
        platform,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at,
        account_id: tokens.account_id,
        account_name: tokens.account_name,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_keeps_only_non_secret_metadata() {
        let mut extra = serde_json::Map::new();
        extra.insert("scope".into(), "ads_read".into());
        let tokens = TokenResult {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_in_seconds: Some(3600),
            extra,
            ..TokenResult::default()
        };

        let candidate = candidate_from_tokens(Uuid::new_v4(), Platform::GoogleAds, tokens, true);
        let metadata = candidate.metadata.unwrap();
        assert_eq!(metadata["scope"], "ads_read");
        assert!(!metadata.to_string().contains("\"rt\""));
        assert!(candidate.expires_at.unwrap() > Utc::now());
    }

    #[test]
    fn refresh_candidate_leaves_metadata_untouched() {
        let tokens = TokenResult {
            access_token: "at".into(),
            ..TokenResult::default()
        };
        let candidate = candidate_from_tokens(Uuid::new_v4(), Platform::TiktokAds, tokens, false);
        assert!(candidate.metadata.is_none());
        assert!(candidate.refresh_token.is_none());
        assert!(candidate.expires_at.is_none());
    }
}

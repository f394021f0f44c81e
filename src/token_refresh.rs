//! # Token Refresh Service
//!
//! Keeps platform access tokens usable. [`TokenRefreshService::ensure_fresh`]
//! is called before every reporting fetch; the background loop refreshes
//! connections nearing expiry and purges stale pending authorizations.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, ReportingAccess};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::platform_connection;
use crate::oauth::candidate_from_tokens;
use crate::platform::Platform;
use crate::repositories::{ConnectionRepository, OAuthStateRepository};

type PairLocks = HashMap<(Uuid, Platform), Arc<Mutex<()>>>;

/// Background and on-demand token refresh
#[derive(Clone)]
pub struct TokenRefreshService {
    config: Arc<AppConfig>,
    connections: Arc<ConnectionRepository>,
    registry: Arc<AdapterRegistry>,
    oauth_states: OAuthStateRepository,
    /// One lock per (user, platform); concurrent callers share a single refresh
    in_flight: Arc<Mutex<PairLocks>>,
}

/// Counts for one background tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub connections_polled: u64,
    pub refreshes_succeeded: u64,
    /// Refreshed by another caller, or disconnected, after the scan
    pub refreshes_skipped: u64,
    pub refreshes_failed: u64,
    pub oauth_states_purged: u64,
}

/// Classification of token refresh errors for appropriate handling
#[derive(Debug, PartialEq)]
pub enum RefreshErrorClassification {
    /// The grant is gone (revoked, invalid); only re-authorization helps
    Permanent,
    /// Network or upstream hiccup; the next tick retries
    Transient,
    /// The platform throttled us
    RateLimited,
}

impl TokenRefreshService {
    pub fn new(
        config: Arc<AppConfig>,
        connections: Arc<ConnectionRepository>,
        registry: Arc<AdapterRegistry>,
        oauth_states: OAuthStateRepository,
    ) -> Self {
        Self {
            config,
            connections,
            registry,
            oauth_states,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lead_time(&self) -> Duration {
        Duration::seconds(self.config.token_refresh.lead_time_seconds as i64)
    }

    async fn pair_lock(&self, user_id: Uuid, platform: Platform) -> Arc<Mutex<()>> {
        let mut locks = self.in_flight.lock().await;
        locks
            .entry((user_id, platform))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the caller's handle and forgets the pair once no one else holds it.
    async fn release_pair_lock(&self, user_id: Uuid, platform: Platform, lock: Arc<Mutex<()>>) {
        let mut locks = self.in_flight.lock().await;
        drop(lock);
        let key = (user_id, platform);
        if locks.get(&key).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(&key);
        }
    }

    /// Runs `work` while holding the pair lock.
    async fn with_pair_lock<T, F, Fut>(&self, user_id: Uuid, platform: Platform, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.pair_lock(user_id, platform).await;
        let output = {
            let _guard = lock.lock().await;
            work().await
        };
        self.release_pair_lock(user_id, platform, lock).await;
        output
    }

    /// Number of (user, platform) pairs with a refresh lock currently tracked.
    pub async fn in_flight_pairs(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Credentials for a reporting call, refreshing first when the token is
    /// within the lead time of its expiry.
    ///
    /// Fails with [`AppError::ReconnectRequired`] when there is no connection,
    /// or when a needed refresh is impossible or rejected.
    #[instrument(skip_all, fields(%user_id, %platform))]
    pub async fn ensure_fresh(&self, user_id: Uuid, platform: Platform) -> AppResult<ReportingAccess> {
        self.with_pair_lock(user_id, platform, || self.ensure_fresh_locked(user_id, platform))
            .await
    }

    async fn ensure_fresh_locked(&self, user_id: Uuid, platform: Platform) -> AppResult<ReportingAccess> {
        // Read under the lock: a refresh that finished while we waited is visible here
        let connection = self
            .connections
            .get_connection(user_id, platform)
            .await?
            .ok_or_else(|| AppError::ReconnectRequired {
                platform,
                reason: "no connection".to_string(),
            })?;

        if !expires_by(&connection, Utc::now() + self.lead_time()) {
            let tokens = self.connections.decrypt_tokens(&connection)?;
            return Ok(ReportingAccess::new(tokens.access_token, connection.account_id));
        }

        let refreshed = self.refresh_locked(&connection, platform).await?;
        let tokens = self.connections.decrypt_tokens(&refreshed)?;
        Ok(ReportingAccess::new(tokens.access_token, refreshed.account_id))
    }

    /// Refresh now regardless of expiry.
    #[instrument(skip_all, fields(%user_id, %platform))]
    pub async fn force_refresh(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> AppResult<platform_connection::Model> {
        self.with_pair_lock(user_id, platform, || async {
            let connection = self
                .connections
                .get_connection(user_id, platform)
                .await?
                .ok_or_else(|| AppError::ReconnectRequired {
                    platform,
                    reason: "no connection".to_string(),
                })?;
            self.refresh_locked(&connection, platform).await
        })
        .await
    }

    /// Tick path. The scan snapshot may be stale by the time the lock is
    /// held, so the row is read again; `Ok(false)` means nothing was due.
    async fn refresh_if_due(
        &self,
        user_id: Uuid,
        platform: Platform,
        cutoff: DateTime<Utc>,
    ) -> AppResult<bool> {
        let Some(connection) = self.connections.get_connection(user_id, platform).await? else {
            debug!(%user_id, %platform, "Connection removed before scheduled refresh");
            return Ok(false);
        };
        if !expires_by(&connection, cutoff) {
            debug!(%user_id, %platform, "Connection already refreshed");
            return Ok(false);
        }
        self.refresh_locked(&connection, platform).await?;
        Ok(true)
    }

    /// Refresh one connection. The caller holds the pair lock.
    async fn refresh_locked(
        &self,
        connection: &platform_connection::Model,
        platform: Platform,
    ) -> AppResult<platform_connection::Model> {
        let refresh_start = std::time::Instant::now();
        let adapter = self.registry.get(platform)?;
        let tokens = self.connections.decrypt_tokens(connection)?;

        let refresh_material = match tokens.refresh_token {
            Some(refresh_token) => Some(refresh_token),
            None if adapter.metadata().refreshes_with_access_token => {
                let expired = connection
                    .expires_at
                    .is_some_and(|exp| exp.with_timezone(&Utc) <= Utc::now());
                (!expired).then_some(tokens.access_token)
            }
            None => None,
        };
        let Some(refresh_material) = refresh_material else {
            counter!("token_refresh_failure_total", "platform" => platform.as_str()).increment(1);
            return Err(AppError::ReconnectRequired {
                platform,
                reason: "no refresh material available".to_string(),
            });
        };

        counter!("token_refresh_attempts_total", "platform" => platform.as_str()).increment(1);
        let refreshed = match adapter.refresh_token(&refresh_material).await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                counter!("token_refresh_failure_total", "platform" => platform.as_str())
                    .increment(1);
                let classification = classify_refresh_error(&err);
                warn!(
                    %platform,
                    user_id = %connection.user_id,
                    ?classification,
                    error = %err,
                    "Token refresh failed"
                );
                return Err(AppError::ReconnectRequired {
                    platform,
                    reason: err.to_string(),
                });
            }
        };

        let updated = self
            .connections
            .upsert_connection(candidate_from_tokens(
                connection.user_id,
                platform,
                refreshed,
                false,
            ))
            .await?;

        histogram!("token_refresh_latency_ms").record(refresh_start.elapsed().as_secs_f64() * 1_000.0);
        counter!("token_refresh_success_total", "platform" => platform.as_str()).increment(1);
        info!(
            %platform,
            user_id = %connection.user_id,
            expires_at = ?updated.expires_at,
            "Refreshed connection tokens"
        );
        Ok(updated)
    }

    /// Run the refresh loop until the shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting token refresh service");
        let tick_interval = TokioDuration::from_secs(self.config.token_refresh.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Token refresh service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick(Utc::now()).await {
                        error!(error = %err, "Token refresh tick failed");
                    }
                    histogram!("token_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Token refresh service stopped");
    }

    /// One pass: purge expired pending authorizations, then refresh every
    /// connection expiring within the lead time, `concurrency` at a time.
    #[instrument(skip_all)]
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<TickStats> {
        let mut stats = TickStats {
            oauth_states_purged: self.oauth_states.cleanup_expired(now).await?,
            ..TickStats::default()
        };

        let cutoff = now + self.lead_time();
        let due = self.connections.find_expiring(cutoff).await?;
        stats.connections_polled = due.len() as u64;
        debug!(
            due = due.len(),
            lead_time_seconds = self.config.token_refresh.lead_time_seconds,
            "Found connections due for token refresh"
        );

        let semaphore = Arc::new(Semaphore::new(
            self.config.token_refresh.concurrency.max(1) as usize,
        ));
        let mut handles = Vec::with_capacity(due.len());

        for connection in due {
            let Ok(platform) = connection.platform.parse::<Platform>() else {
                warn!(platform = %connection.platform, "Skipping connection with unknown platform");
                stats.refreshes_failed += 1;
                continue;
            };
            let service = self.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::integration(format!("refresh semaphore closed: {e}")))?;

                let jitter_seconds = service.compute_jitter();
                if jitter_seconds > 0 {
                    sleep(TokioDuration::from_secs(jitter_seconds)).await;
                }

                let user_id = connection.user_id;
                service
                    .with_pair_lock(user_id, platform, || {
                        service.refresh_if_due(user_id, platform, cutoff)
                    })
                    .await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(true)) => stats.refreshes_succeeded += 1,
                Ok(Ok(false)) => stats.refreshes_skipped += 1,
                Ok(Err(_)) => stats.refreshes_failed += 1,
                Err(e) => {
                    stats.refreshes_failed += 1;
                    error!(error = ?e, "Refresh task panicked or was cancelled");
                }
            }
        }

        gauge!("token_refresh_connections_polled_gauge").set(stats.connections_polled as f64);
        gauge!("token_refresh_in_flight_pairs_gauge").set(self.in_flight_pairs().await as f64);
        debug!(?stats, "Token refresh tick completed");
        Ok(stats)
    }

    fn compute_jitter(&self) -> u64 {
        let factor = self.config.token_refresh.jitter_factor;
        if factor <= 0.0 {
            return 0;
        }
        let max_delay_seconds = (self.config.token_refresh.lead_time_seconds as f64 * factor) as u64;
        rand::thread_rng().gen_range(0..=max_delay_seconds)
    }
}

fn expires_by(connection: &platform_connection::Model, cutoff: DateTime<Utc>) -> bool {
    connection
        .expires_at
        .is_some_and(|exp| exp.with_timezone(&Utc) <= cutoff)
}

/// Classify a refresh failure by upstream status, falling back to the
/// OAuth error vocabulary in the message.
pub fn classify_refresh_error(error: &AppError) -> RefreshErrorClassification {
    let (status, message) = match error {
        AppError::OAuthExchange {
            http_status,
            platform_message,
            ..
        }
        | AppError::PlatformApi {
            http_status,
            platform_message,
            ..
        } => (*http_status, platform_message.to_lowercase()),
        other => (None, other.to_string().to_lowercase()),
    };

    match status {
        Some(429) => return RefreshErrorClassification::RateLimited,
        Some(400 | 401 | 403) => return RefreshErrorClassification::Permanent,
        _ => {}
    }

    if ["invalid_grant", "invalid_client", "unauthorized_client", "revoked", "access_denied"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        return RefreshErrorClassification::Permanent;
    }
    if ["rate_limit", "rate limit", "too_many_requests", "quota"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        return RefreshErrorClassification::RateLimited;
    }
    RefreshErrorClassification::Transient
}

//! Configuration loading for the CampaignIQ API.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CAMPAIGNIQ_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "CAMPAIGNIQ_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `CAMPAIGNIQ_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
    /// Base used to build `/api/platforms/callback/{platform}` redirect URIs.
    #[serde(default = "default_redirect_uri_base")]
    pub redirect_uri_base: String,
    /// Where the callback sends the browser once the exchange settles.
    #[serde(default = "default_redirect_uri_base")]
    pub frontend_base_url: String,
    /// Revenue attributed to one conversion when computing ROAS.
    #[serde(default = "default_assumed_value_per_conversion")]
    pub assumed_value_per_conversion: f64,
    #[serde(default = "default_pkce_verifier_length")]
    pub pkce_verifier_length: usize,
    #[serde(default = "default_oauth_state_ttl_seconds")]
    pub oauth_state_ttl_seconds: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default)]
    pub google_ads: GoogleAdsConfig,
    #[serde(default)]
    pub meta_ads: MetaAdsConfig,
    #[serde(default)]
    pub tiktok_ads: TikTokAdsConfig,
    #[serde(default)]
    pub token_refresh: TokenRefreshConfig,
}

/// Google Ads OAuth client and reporting API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GoogleAdsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Required by the reporting API on every call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_token: Option<String>,
    /// Manager account id sent as `login-customer-id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_customer_id: Option<String>,
    #[serde(default = "default_google_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    #[serde(default = "default_google_api_base")]
    pub api_base: String,
    #[serde(default = "default_google_api_version")]
    pub api_version: String,
}

/// Meta (Facebook/Instagram) app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MetaAdsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    #[serde(default = "default_meta_graph_base")]
    pub graph_base: String,
    #[serde(default = "default_meta_dialog_base")]
    pub dialog_base: String,
    #[serde(default = "default_meta_graph_version")]
    pub graph_version: String,
}

/// TikTok for Business app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TikTokAdsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    #[serde(default = "default_tiktok_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_tiktok_api_base")]
    pub api_base: String,
}

impl GoogleAdsConfig {
    /// Both halves of the OAuth client must be present for the adapter to register.
    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

impl MetaAdsConfig {
    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_secret.is_some()
    }
}

impl TikTokAdsConfig {
    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_secret.is_some()
    }
}

/// Token refresh service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TokenRefreshConfig {
    /// Background refresh interval in seconds (default: 3600)
    #[serde(default = "default_token_refresh_tick_seconds")]
    pub tick_seconds: u64,

    /// Lead time before expiry to trigger refresh in seconds (default: 600)
    #[serde(default = "default_token_refresh_lead_time_seconds")]
    pub lead_time_seconds: u64,

    /// Maximum number of concurrent refresh operations (default: 4)
    #[serde(default = "default_token_refresh_concurrency")]
    pub concurrency: u32,

    /// Jitter factor to avoid thundering herd (default: 0.1)
    #[serde(default = "default_token_refresh_jitter_factor")]
    pub jitter_factor: f64,
}

impl TokenRefreshConfig {
    /// Validate token refresh configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_seconds < 60 {
            return Err(ConfigError::InvalidTokenRefreshTickInterval {
                value: self.tick_seconds,
            });
        }

        if self.lead_time_seconds < 60 || self.lead_time_seconds > 86400 {
            return Err(ConfigError::InvalidTokenRefreshLeadTime {
                value: self.lead_time_seconds,
            });
        }

        if self.concurrency == 0 || self.concurrency > 20 {
            return Err(ConfigError::InvalidTokenRefreshConcurrency {
                value: self.concurrency,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidTokenRefreshJitter {
                value: self.jitter_factor,
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            crypto_key: None,
            session_secret: None,
            session_cookie_name: default_session_cookie_name(),
            redirect_uri_base: default_redirect_uri_base(),
            frontend_base_url: default_redirect_uri_base(),
            assumed_value_per_conversion: default_assumed_value_per_conversion(),
            pkce_verifier_length: default_pkce_verifier_length(),
            oauth_state_ttl_seconds: default_oauth_state_ttl_seconds(),
            http_timeout_ms: default_http_timeout_ms(),
            google_ads: GoogleAdsConfig::default(),
            meta_ads: MetaAdsConfig::default(),
            tiktok_ads: TikTokAdsConfig::default(),
            token_refresh: TokenRefreshConfig::default(),
        }
    }
}

impl Default for GoogleAdsConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            developer_token: None,
            login_customer_id: None,
            auth_url: default_google_auth_url(),
            token_url: default_google_token_url(),
            api_base: default_google_api_base(),
            api_version: default_google_api_version(),
        }
    }
}

impl Default for MetaAdsConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            graph_base: default_meta_graph_base(),
            dialog_base: default_meta_dialog_base(),
            graph_version: default_meta_graph_version(),
        }
    }
}

impl Default for TikTokAdsConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            auth_url: default_tiktok_auth_url(),
            api_base: default_tiktok_api_base(),
        }
    }
}

impl Default for TokenRefreshConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_token_refresh_tick_seconds(),
            lead_time_seconds: default_token_refresh_lead_time_seconds(),
            concurrency: default_token_refresh_concurrency(),
            jitter_factor: default_token_refresh_jitter_factor(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Outbound timeout applied to every platform HTTP call.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.crypto_key.is_some() {
            config.crypto_key = Some(REDACTED.as_bytes().to_vec());
        }
        redact(&mut config.session_secret);
        redact(&mut config.google_ads.client_secret);
        redact(&mut config.google_ads.developer_token);
        redact(&mut config.meta_ads.app_secret);
        redact(&mut config.tiktok_ads.app_secret);
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        match self.session_secret {
            Some(ref secret) if secret.len() < 32 => {
                return Err(ConfigError::SessionSecretTooShort {
                    length: secret.len(),
                });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingSessionSecret),
        }

        if !self.assumed_value_per_conversion.is_finite() || self.assumed_value_per_conversion <= 0.0
        {
            return Err(ConfigError::InvalidAssumedValuePerConversion {
                value: self.assumed_value_per_conversion,
            });
        }

        // RFC 7636 section 4.1
        if !(43..=128).contains(&self.pkce_verifier_length) {
            return Err(ConfigError::InvalidPkceVerifierLength {
                value: self.pkce_verifier_length,
            });
        }

        if self.oauth_state_ttl_seconds < 60 {
            return Err(ConfigError::InvalidOAuthStateTtl {
                value: self.oauth_state_ttl_seconds,
            });
        }

        if self.http_timeout_ms == 0 || self.http_timeout_ms > 120_000 {
            return Err(ConfigError::InvalidHttpTimeout {
                value: self.http_timeout_ms,
            });
        }

        self.token_refresh.validate()?;

        Ok(())
    }
}

fn redact(value: &mut Option<String>) {
    if value.is_some() {
        *value = Some(REDACTED.to_string());
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/campaigniq".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_session_cookie_name() -> String {
    "campaigniq_session".to_string()
}

fn default_redirect_uri_base() -> String {
    "http://localhost:5000".to_string()
}

fn default_assumed_value_per_conversion() -> f64 {
    100.0
}

fn default_pkce_verifier_length() -> usize {
    64
}

fn default_oauth_state_ttl_seconds() -> u64 {
    900 // 15 minutes
}

fn default_http_timeout_ms() -> u64 {
    15_000
}

fn default_google_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_google_api_base() -> String {
    "https://googleads.googleapis.com".to_string()
}

fn default_google_api_version() -> String {
    "v17".to_string()
}

fn default_meta_graph_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_meta_dialog_base() -> String {
    "https://www.facebook.com".to_string()
}

fn default_meta_graph_version() -> String {
    "v17.0".to_string()
}

fn default_tiktok_auth_url() -> String {
    "https://ads.tiktok.com/marketing_api/auth".to_string()
}

fn default_tiktok_api_base() -> String {
    "https://business-api.tiktok.com".to_string()
}

fn default_token_refresh_tick_seconds() -> u64 {
    3600 // 1 hour
}

fn default_token_refresh_lead_time_seconds() -> u64 {
    600 // 10 minutes
}

fn default_token_refresh_concurrency() -> u32 {
    4
}

fn default_token_refresh_jitter_factor() -> f64 {
    0.1
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("crypto key is missing; set CAMPAIGNIQ_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("session secret is missing; set CAMPAIGNIQ_SESSION_SECRET environment variable")]
    MissingSessionSecret,
    #[error("session secret must be at least 32 bytes, got {length} bytes")]
    SessionSecretTooShort { length: usize },
    #[error("assumed value per conversion must be a positive number, got {value}")]
    InvalidAssumedValuePerConversion { value: f64 },
    #[error("pkce verifier length must be between 43 and 128 characters, got {value}")]
    InvalidPkceVerifierLength { value: usize },
    #[error("oauth state ttl must be at least 60 seconds, got {value}")]
    InvalidOAuthStateTtl { value: u64 },
    #[error("http timeout must be between 1 and 120000 milliseconds, got {value}")]
    InvalidHttpTimeout { value: u64 },
    #[error("token refresh tick interval must be at least 60 seconds, got {value}")]
    InvalidTokenRefreshTickInterval { value: u64 },
    #[error("token refresh lead time must be between 60 and 86400 seconds, got {value}")]
    InvalidTokenRefreshLeadTime { value: u64 },
    #[error("token refresh concurrency must be between 1 and 20, got {value}")]
    InvalidTokenRefreshConcurrency { value: u32 },
    #[error("token refresh jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidTokenRefreshJitter { value: f64 },
}

/// Loads configuration using layered `.env` files and `CAMPAIGNIQ_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, validates and returns the application configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_non_empty(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_non_empty(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_non_empty(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_non_empty(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url =
            take_non_empty(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take_parsed(&mut layered, "DB_MAX_CONNECTIONS")
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take_parsed(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let crypto_key = match take_non_empty(&mut layered, "CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(&key_str).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        let session_secret = take_non_empty(&mut layered, "SESSION_SECRET");
        let session_cookie_name = take_non_empty(&mut layered, "SESSION_COOKIE_NAME")
            .unwrap_or_else(default_session_cookie_name);
        let redirect_uri_base = take_non_empty(&mut layered, "REDIRECT_URI_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(default_redirect_uri_base);
        let frontend_base_url = take_non_empty(&mut layered, "FRONTEND_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| redirect_uri_base.clone());
        let assumed_value_per_conversion =
            take_parsed(&mut layered, "ASSUMED_VALUE_PER_CONVERSION")
                .unwrap_or_else(default_assumed_value_per_conversion);
        let pkce_verifier_length = take_parsed(&mut layered, "PKCE_VERIFIER_LENGTH")
            .unwrap_or_else(default_pkce_verifier_length);
        let oauth_state_ttl_seconds = take_parsed(&mut layered, "OAUTH_STATE_TTL_SECONDS")
            .unwrap_or_else(default_oauth_state_ttl_seconds);
        let http_timeout_ms =
            take_parsed(&mut layered, "HTTP_TIMEOUT_MS").unwrap_or_else(default_http_timeout_ms);

        let google_ads = GoogleAdsConfig {
            client_id: take_non_empty(&mut layered, "GOOGLE_ADS_CLIENT_ID"),
            client_secret: take_non_empty(&mut layered, "GOOGLE_ADS_CLIENT_SECRET"),
            developer_token: take_non_empty(&mut layered, "GOOGLE_ADS_DEVELOPER_TOKEN"),
            // The header wants digits only
            login_customer_id: take_non_empty(&mut layered, "GOOGLE_ADS_LOGIN_CUSTOMER_ID")
                .map(|v| v.replace('-', "")),
            auth_url: take_non_empty(&mut layered, "GOOGLE_ADS_AUTH_URL")
                .unwrap_or_else(default_google_auth_url),
            token_url: take_non_empty(&mut layered, "GOOGLE_ADS_TOKEN_URL")
                .unwrap_or_else(default_google_token_url),
            api_base: take_non_empty(&mut layered, "GOOGLE_ADS_API_BASE")
                .unwrap_or_else(default_google_api_base),
            api_version: take_non_empty(&mut layered, "GOOGLE_ADS_API_VERSION")
                .unwrap_or_else(default_google_api_version),
        };

        let meta_ads = MetaAdsConfig {
            app_id: take_non_empty(&mut layered, "META_APP_ID"),
            app_secret: take_non_empty(&mut layered, "META_APP_SECRET"),
            graph_base: take_non_empty(&mut layered, "META_GRAPH_BASE")
                .unwrap_or_else(default_meta_graph_base),
            dialog_base: take_non_empty(&mut layered, "META_DIALOG_BASE")
                .unwrap_or_else(default_meta_dialog_base),
            graph_version: take_non_empty(&mut layered, "META_GRAPH_VERSION")
                .unwrap_or_else(default_meta_graph_version),
        };

        let tiktok_ads = TikTokAdsConfig {
            app_id: take_non_empty(&mut layered, "TIKTOK_APP_ID"),
            app_secret: take_non_empty(&mut layered, "TIKTOK_APP_SECRET"),
            auth_url: take_non_empty(&mut layered, "TIKTOK_AUTH_URL")
                .unwrap_or_else(default_tiktok_auth_url),
            api_base: take_non_empty(&mut layered, "TIKTOK_API_BASE")
                .unwrap_or_else(default_tiktok_api_base),
        };

        let token_refresh = TokenRefreshConfig {
            tick_seconds: take_parsed(&mut layered, "TOKEN_REFRESH_TICK_SECONDS")
                .unwrap_or_else(default_token_refresh_tick_seconds),
            lead_time_seconds: take_parsed(&mut layered, "TOKEN_REFRESH_LEAD_TIME_SECONDS")
                .unwrap_or_else(default_token_refresh_lead_time_seconds),
            concurrency: take_parsed(&mut layered, "TOKEN_REFRESH_CONCURRENCY")
                .unwrap_or_else(default_token_refresh_concurrency),
            jitter_factor: take_parsed(&mut layered, "TOKEN_REFRESH_JITTER_FACTOR")
                .unwrap_or_else(default_token_refresh_jitter_factor),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            crypto_key,
            session_secret,
            session_cookie_name,
            redirect_uri_base,
            frontend_base_url,
            assumed_value_per_conversion,
            pkce_verifier_length,
            oauth_state_ttl_seconds,
            http_timeout_ms,
            google_ads,
            meta_ads,
            tiktok_ads,
            token_refresh,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_non_empty(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered.remove(key).and_then(|val| {
        let trimmed = val.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn take_parsed<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
) -> Option<T> {
    layered.remove(key).and_then(|v| v.trim().parse().ok())
}

//! Adapter metadata types

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Metadata about a registered platform adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMetadata {
    pub platform: Platform,
    /// Human-readable platform name
    pub display_name: String,
    /// OAuth scopes requested on authorize
    pub scopes: Vec<String>,
    /// Whether the authorize/exchange legs accept a PKCE challenge
    pub supports_pkce: bool,
    /// Whether single-campaign detail fetches are implemented
    pub supports_campaign_details: bool,
    /// Refresh re-exchanges the current access token (no refresh tokens issued)
    pub refreshes_with_access_token: bool,
}

impl AdapterMetadata {
    pub fn new(platform: Platform, scopes: &[&str], supports_pkce: bool) -> Self {
        Self {
            platform,
            display_name: platform.display_name().to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            supports_pkce,
            supports_campaign_details: true,
            refreshes_with_access_token: false,
        }
    }

    pub fn without_campaign_details(mut self) -> Self {
        self.supports_campaign_details = false;
        self
    }

    pub fn with_access_token_refresh(mut self) -> Self {
        self.refreshes_with_access_token = true;
        self
    }
}

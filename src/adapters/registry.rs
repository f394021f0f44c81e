//! Adapter registry
//!
//! Maps each [`Platform`] to the adapter instance serving it. Built once at
//! startup from configuration and shared through application state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{
    AdPlatformAdapter, AdapterMetadata, GoogleAdsAdapter, MetaAdsAdapter, TikTokAdsAdapter,
};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::platform::Platform;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Platform, Arc<dyn AdPlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for every platform whose credentials are configured.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let mut registry = Self::new();
        let timeout = config.http_timeout();

        if config.google_ads.is_configured() {
            registry.register(Arc::new(GoogleAdsAdapter::new(&config.google_ads, timeout)?));
        } else {
            warn!(platform = %Platform::GoogleAds, "Adapter not registered: missing client credentials");
        }

        if config.meta_ads.is_configured() {
            for platform in [Platform::FacebookAds, Platform::InstagramAds] {
                registry.register(Arc::new(MetaAdsAdapter::new(
                    platform,
                    &config.meta_ads,
                    timeout,
                )?));
            }
        } else {
            warn!("Meta adapters not registered: missing app credentials");
        }

        if config.tiktok_ads.is_configured() {
            registry.register(Arc::new(TikTokAdsAdapter::new(&config.tiktok_ads, timeout)?));
        } else {
            warn!(platform = %Platform::TiktokAds, "Adapter not registered: missing app credentials");
        }

        info!(
            platforms = ?registry.adapters.keys().map(Platform::as_str).collect::<Vec<_>>(),
            "Adapter registry initialized"
        );
        Ok(registry)
    }

    /// Register (or replace) the adapter for its platform.
    pub fn register(&mut self, adapter: Arc<dyn AdPlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> AppResult<Arc<dyn AdPlatformAdapter>> {
        self.adapters.get(&platform).cloned().ok_or_else(|| {
            AppError::validation("platform", format!("{platform} is not enabled on this server"))
        })
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    /// Metadata for every registered adapter, in [`Platform::ALL`] order.
    pub fn list_metadata(&self) -> Vec<AdapterMetadata> {
        self.adapters.values().map(|adapter| adapter.metadata()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GoogleAdsConfig, MetaAdsConfig};

    #[test]
    fn empty_config_registers_nothing() {
        let registry = AdapterRegistry::from_config(&AppConfig::default()).unwrap();
        assert!(registry.platforms().is_empty());

        let err = registry.get(Platform::GoogleAds).err().unwrap();
        assert!(matches!(err, AppError::Validation { field: "platform", .. }));
    }

    #[test]
    fn meta_credentials_register_both_placements() {
        let config = AppConfig {
            meta_ads: MetaAdsConfig {
                app_id: Some("app".into()),
                app_secret: Some("secret".into()),
                ..MetaAdsConfig::default()
            },
            ..AppConfig::default()
        };

        let registry = AdapterRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.platforms(),
            vec![Platform::FacebookAds, Platform::InstagramAds]
        );
        assert_eq!(
            registry.get(Platform::InstagramAds).unwrap().platform(),
            Platform::InstagramAds
        );
    }

    #[test]
    fn metadata_follows_platform_order() {
        let config = AppConfig {
            google_ads: GoogleAdsConfig {
                client_id: Some("id".into()),
                client_secret: Some("secret".into()),
                ..GoogleAdsConfig::default()
            },
            meta_ads: MetaAdsConfig {
                app_id: Some("app".into()),
                app_secret: Some("secret".into()),
                ..MetaAdsConfig::default()
            },
            ..AppConfig::default()
        };

        let metadata = AdapterRegistry::from_config(&config).unwrap().list_metadata();
        let platforms: Vec<_> = metadata.iter().map(|m| m.platform).collect();
        assert_eq!(
            platforms,
            vec![Platform::GoogleAds, Platform::FacebookAds, Platform::InstagramAds]
        );
        assert!(metadata[0].supports_pkce);
    }
}

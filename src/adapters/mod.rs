//! Ad platform adapters
//!
//! - [`AdPlatformAdapter`]: the contract every platform implements
//! - [`AdapterRegistry`]: platform to adapter lookup
//! - One module per platform family

pub mod google_ads;
pub(crate) mod http;
pub mod meta_ads;
pub mod metadata;
pub mod registry;
pub mod tiktok_ads;
pub mod trait_;

pub use google_ads::GoogleAdsAdapter;
pub use meta_ads::MetaAdsAdapter;
pub use metadata::AdapterMetadata;
pub use registry::AdapterRegistry;
pub use tiktok_ads::TikTokAdsAdapter;
pub use trait_::{AdPlatformAdapter, AdPlatformMetrics, ReportingAccess, TokenResult};

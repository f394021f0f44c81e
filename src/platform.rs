//! Ad platform identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// An advertising platform a user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleAds,
    FacebookAds,
    InstagramAds,
    TiktokAds,
}

impl Platform {
    /// Every platform, in display order.
    pub const ALL: [Platform; 4] = [
        Platform::GoogleAds,
        Platform::FacebookAds,
        Platform::InstagramAds,
        Platform::TiktokAds,
    ];

    /// Stable identifier used in URLs, storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleAds => "google_ads",
            Platform::FacebookAds => "facebook_ads",
            Platform::InstagramAds => "instagram_ads",
            Platform::TiktokAds => "tiktok_ads",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::GoogleAds => "Google Ads",
            Platform::FacebookAds => "Facebook Ads",
            Platform::InstagramAds => "Instagram Ads",
            Platform::TiktokAds => "TikTok Ads",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == value)
            .ok_or_else(|| AppError::validation("platform", format!("unknown platform '{value}'")))
    }
}

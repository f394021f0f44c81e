//! # Data Models
//!
//! SeaORM entities backing the CampaignIQ API, plus small shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod campaign_metric;
pub mod metric_insight;
pub mod oauth_state;
pub mod platform_connection;
pub mod user;

pub use campaign_metric::Entity as CampaignMetric;
pub use metric_insight::Entity as MetricInsight;
pub use oauth_state::Entity as OAuthState;
pub use platform_connection::Entity as PlatformConnection;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
    /// `ok` when the database answered
    pub status: String,
}

impl ServiceInfo {
    pub fn with_status(status: &str) -> Self {
        Self {
            service: "campaigniq".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: status.to_string(),
        }
    }
}

//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for each
//! table, scoped by the owning user.

pub mod connection;
pub mod insight;
pub mod metrics;
pub mod oauth_state;
pub mod user;

pub use connection::{ConnectionCandidate, ConnectionRepository, ConnectionTokens};
pub use insight::InsightRepository;
pub use metrics::{MetricsRepository, NewCampaignMetric};
pub use oauth_state::{OAuthStateRepository, PendingAuthorization};
pub use user::{NewUser, UserRepository};

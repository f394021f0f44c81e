//! # CampaignIQ Library
//!
//! OAuth connection lifecycle for ad platforms, metrics ingestion and the
//! aggregation engine behind the CampaignIQ dashboard API.

pub mod adapters;
pub mod aggregation;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod date_range;
pub mod db;
pub mod demo;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod pkce;
pub mod platform;
pub mod repositories;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod token_refresh;
pub use migration;

//! # Server Configuration
//!
//! Application state wiring, the `/api` router and the HTTP listener.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::AdapterRegistry;
use crate::aggregation::AggregationEngine;
use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::error::{AppError, AppResult};
use crate::handlers::{self, metrics, platforms};
use crate::oauth::OAuthFlowManager;
use crate::repositories::{
    ConnectionRepository, InsightRepository, MetricsRepository, OAuthStateRepository,
    UserRepository,
};
use crate::sync::MetricsSyncService;
use crate::telemetry::trace_context_middleware;
use crate::token_refresh::TokenRefreshService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub users: UserRepository,
    pub connections: Arc<ConnectionRepository>,
    pub registry: Arc<AdapterRegistry>,
    pub oauth: OAuthFlowManager,
    pub token_refresh: TokenRefreshService,
    pub sync: MetricsSyncService,
    pub aggregation: AggregationEngine,
}

impl AppState {
    /// Wire repositories and services over one database handle.
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        registry: AdapterRegistry,
    ) -> AppResult<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| AppError::integration("crypto key is not configured"))?;
        let crypto_key = CryptoKey::new(key_bytes)?;

        let shared_db = Arc::new(db.clone());
        let registry = Arc::new(registry);
        let connections = Arc::new(ConnectionRepository::new(Arc::clone(&shared_db), crypto_key));
        let oauth_states = OAuthStateRepository::new(Arc::clone(&shared_db));
        let metrics_repo = MetricsRepository::new(Arc::clone(&shared_db));

        let oauth = OAuthFlowManager::new(
            &config,
            Arc::clone(&registry),
            oauth_states.clone(),
            Arc::clone(&connections),
        );
        let token_refresh = TokenRefreshService::new(
            Arc::clone(&config),
            Arc::clone(&connections),
            Arc::clone(&registry),
            oauth_states,
        );
        let sync = MetricsSyncService::new(
            Arc::clone(&connections),
            metrics_repo.clone(),
            Arc::clone(&registry),
            token_refresh.clone(),
        );
        let aggregation = AggregationEngine::new(
            metrics_repo,
            Arc::clone(&connections),
            InsightRepository::new(Arc::clone(&shared_db)),
            config.assumed_value_per_conversion,
        );

        Ok(Self {
            users: UserRepository::new(shared_db),
            config,
            db,
            connections,
            registry,
            oauth,
            token_refresh,
            sync,
            aggregation,
        })
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(config.frontend_base_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                frontend_base_url = %config.frontend_base_url,
                "Frontend URL is not a valid origin; cross-origin requests disabled"
            );
            layer
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/user", get(handlers::current_user))
        .route("/platforms", get(platforms::list_connections))
        .route("/platforms/available", get(platforms::list_available))
        .route("/platforms/connect/{platform}", get(platforms::connect))
        .route("/platforms/callback/{platform}", get(platforms::callback))
        .route("/platforms/{platform}", delete(platforms::disconnect))
        .route("/platforms/{platform}/refresh", post(platforms::refresh))
        .route("/metrics/summary", get(metrics::summary))
        .route("/metrics/platforms", get(metrics::platforms))
        .route("/metrics/spend-distribution", get(metrics::spend_distribution))
        .route("/metrics/top-campaigns", get(metrics::top_campaigns))
        .route("/metrics/performance", get(metrics::performance))
        .route("/metrics/insights", get(metrics::insights))
        .route("/metrics/fetch", post(metrics::fetch))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);

    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state.config.bind_addr()?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "session",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::current_user,
        crate::handlers::platforms::list_connections,
        crate::handlers::platforms::list_available,
        crate::handlers::platforms::connect,
        crate::handlers::platforms::callback,
        crate::handlers::platforms::disconnect,
        crate::handlers::platforms::refresh,
        crate::handlers::metrics::summary,
        crate::handlers::metrics::platforms,
        crate::handlers::metrics::spend_distribution,
        crate::handlers::metrics::top_campaigns,
        crate::handlers::metrics::performance,
        crate::handlers::metrics::insights,
        crate::handlers::metrics::fetch,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::ProviderError,
            crate::platform::Platform,
            crate::handlers::UserProfile,
            crate::handlers::types::SuccessResponse,
            crate::handlers::platforms::ConnectionInfo,
            crate::handlers::platforms::AvailablePlatform,
            crate::handlers::platforms::AuthUrlResponse,
            crate::handlers::metrics::FetchRequest,
            crate::aggregation::MetricSummary,
            crate::aggregation::PlatformPerformance,
            crate::aggregation::SpendDistribution,
            crate::aggregation::TopCampaign,
            crate::aggregation::PerformanceTimeseriesPoint,
            crate::aggregation::MetricInsight,
            crate::aggregation::InsightType,
            crate::aggregation::TimeseriesMetric,
            crate::sync::PlatformSyncOutcome,
        )
    ),
    modifiers(&SessionSecurity),
    info(
        title = "CampaignIQ API",
        description = "Cross-platform ad performance analytics over OAuth-connected ad accounts",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

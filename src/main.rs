//! # CampaignIQ Main Entry Point
//!
//! `serve` (the default) runs the API and the background token refresh loop.
//! `migrate`, `seed-demo` and `reseal-tokens` are one-shot maintenance commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use campaigniq::{
    adapters::AdapterRegistry,
    auth::{DEFAULT_SESSION_TTL_DAYS, issue_session_token},
    config::{AppConfig, ConfigLoader},
    crypto::CryptoKey,
    date_range::DEFAULT_WINDOW_DAYS,
    db,
    demo::DemoContentProvider,
    repositories::{ConnectionRepository, InsightRepository, MetricsRepository, NewUser, UserRepository},
    server::{AppState, run_server},
    telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "campaigniq", version, about = "Cross-platform ad performance analytics API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run migrations, the token refresh loop and the HTTP API
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Create a demo user with sample data and print a session token
    SeedDemo {
        #[arg(long)]
        email: String,
    },
    /// Encrypt any legacy plaintext tokens left in the database
    ResealTokens,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(configuration = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::Migrate => db::run_migrations(&db).await,
        Command::SeedDemo { email } => {
            db::run_migrations(&db).await?;
            seed_demo(&config, db, &email).await
        }
        Command::ResealTokens => {
            let key = CryptoKey::new(config.crypto_key.clone().context("crypto key is not configured")?)?;
            let connections = ConnectionRepository::new(Arc::new(db), key);
            let count = connections.reseal_legacy_tokens().await?;
            println!("Sealed legacy plaintext tokens on {count} connection(s).");
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, db: sea_orm::DatabaseConnection) -> Result<()> {
    db::run_migrations(&db).await?;

    let config = Arc::new(config);
    let registry = AdapterRegistry::from_config(&config)?;
    let state = AppState::new(Arc::clone(&config), db, registry)?;

    let shutdown = CancellationToken::new();
    let refresh_loop = {
        let token_refresh = state.token_refresh.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { token_refresh.run(shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %error, "Failed to listen for ctrl-c");
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        });
    }

    let served = run_server(state, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(error) = refresh_loop.await {
        tracing::warn!(error = %error, "Token refresh loop ended abnormally");
    }
    served
}

async fn seed_demo(config: &AppConfig, db: sea_orm::DatabaseConnection, email: &str) -> Result<()> {
    let db = Arc::new(db);
    let users = UserRepository::new(Arc::clone(&db));
    let user = match users.find_by_email(email).await? {
        Some(user) => user,
        None => {
            users
                .create(NewUser {
                    email: email.to_string(),
                    name: Some("Demo User".to_string()),
                    ..Default::default()
                })
                .await?
        }
    };

    let provider = DemoContentProvider::new(
        MetricsRepository::new(Arc::clone(&db)),
        InsightRepository::new(db),
        config.assumed_value_per_conversion,
    );
    let report = provider
        .seed_user(user.id, Utc::now().date_naive(), DEFAULT_WINDOW_DAYS)
        .await?;

    let token = issue_session_token(config, user.id, Duration::days(DEFAULT_SESSION_TTL_DAYS))?;
    println!("user_id: {}", user.id);
    println!("metric_rows: {}", report.metric_rows);
    println!("insights: {}", report.insights);
    println!("session_token: {token}");
    Ok(())
}

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tablet_monitor::config::{Config, LogFormat};
use tablet_monitor::db::{self, PgTabletStore};
use tablet_monitor::metrics;
use tablet_monitor::notify::WebhookNotifier;
use tablet_monitor::rest::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;

    init_logging(config.log_format);

    info!("Starting Tablet Monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());
    info!("Webhook: {}", config.webhook_url);

    metrics::init_metrics().context("Failed to register metrics")?;

    let pool = db::make_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;

    let notifier =
        WebhookNotifier::new(config.webhook_url.clone()).context("Failed to build HTTP client")?;
    let state = AppState::new(Arc::new(PgTabletStore::new(pool)), notifier);
    let app = rest::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => subscriber.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().with_target(true)).init(),
    }
}

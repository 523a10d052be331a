//! DLMM Sentinel - real-time DEX activity tracker
//!
//! This is the main entry point. It loads configuration, opens the durable
//! store, builds the `Core`, and runs until a shutdown signal arrives.

use dlmm_sentinel::config::AppConfig;
use dlmm_sentinel::core::Core;
use dlmm_sentinel::db;
use dlmm_sentinel::sink::{ActionHint, NotificationSink, SendOutcome};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Placeholder sink used when no chat front end is wired in. Logs each
/// message; the real front end implements `NotificationSink` and is passed
/// to `Core::new` by its own binary.
struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, chat_id: i64, message: &str, _hints: &[ActionHint]) -> SendOutcome {
        tracing::info!(chat_id, message, "Notification");
        SendOutcome::SentOk
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting DLMM Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    tracing::info!(
        dex_api = %config.upstream.dex_api_url,
        pools_ms = config.refresh.pool_refresh_ms,
        "Configuration loaded"
    );

    // Fatal if the durable store cannot be opened.
    let db_pool = db::init_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;
    tracing::info!("Database initialized");

    let core = Core::new(config, db_pool, Arc::new(LogSink)).await?;
    Arc::clone(&core).start().await?;

    shutdown_signal().await;
    core.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received ctrl-c"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received ctrl-c");
    }
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dlmm_sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    if let Err(e) = config.validate() {
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

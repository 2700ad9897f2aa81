//! uptrack-server - upload batch tracking service
//!
//! Loads bootstrap configuration, opens the configured store and serves the
//! HTTP API until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use uptrack_common::config::{ConfigOverrides, StoreBackend, TomlConfig};
use uptrack_server::{build_router, store, AppState};

/// Command-line arguments for uptrack-server
#[derive(Parser, Debug)]
#[command(name = "uptrack-server")]
#[command(about = "Upload batch tracking service")]
#[command(version)]
struct Args {
    /// TOML configuration file (must exist when given)
    #[arg(short, long, env = "UPTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "UPTRACK_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "UPTRACK_PORT")]
    port: Option<u16>,

    /// Store backend: memory or sqlite
    #[arg(long, env = "UPTRACK_STORE")]
    store: Option<StoreBackend>,

    /// SQLite database file (selects the sqlite backend)
    #[arg(long, env = "UPTRACK_DATABASE")]
    database: Option<PathBuf>,

    /// Delay between two snapshots on a subscription, in milliseconds
    #[arg(long, env = "UPTRACK_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "UPTRACK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            store_backend: self.store,
            database_path: self.database.clone(),
            poll_interval_ms: self.poll_interval_ms,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .apply(args.overrides())
        .context("Invalid configuration")?;

    uptrack_common::logging::init_tracing(&config.logging.level)
        .context("Failed to initialize logging")?;

    let bind_addr = config.bind_addr();
    info!(
        "Starting uptrack-server v{} on {} (store: {})",
        env!("CARGO_PKG_VERSION"),
        bind_addr,
        config.store.backend.as_str()
    );

    let store = store::open_store(&config.store)
        .await
        .context("Failed to open upload store")?;
    let state = AppState::new(store, config.notifier.poll_interval());
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("uptrack-server listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open subscriptions never finish on their own
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

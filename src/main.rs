//! waypost server
//!
//! Opens the database, starts the presence rotation task and serves the
//! HTTP API until interrupted or until rotation stalls.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use waypost::api::{create_router, AppState};
use waypost::{Config, Database, PresenceWindow, RotationDriver};

#[derive(Parser)]
#[command(name = "waypost")]
#[command(about = "Presence and message relay for location-aware social apps")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "waypost.toml")]
    config: PathBuf,

    /// HTTP port (overrides config file)
    #[arg(short, long, env = "WAYPOST_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config file)
    #[arg(short, long, env = "WAYPOST_DATABASE")]
    database: Option<PathBuf>,

    /// Drop all tables and start from an empty database
    #[arg(long)]
    reset_database: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("waypost=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting waypost");
    info!("Config file: {}", cli.config.display());

    if !cli.config.exists() {
        info!("Config file not found, using defaults");
    }
    let mut config = Config::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.server.http_port = port;
    }
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }

    info!(
        depth = config.presence.window_depth,
        rotation_interval_ms = config.presence.rotation_interval_ms,
        result_cap = config.proximity.result_cap,
        max_contents_len = config.messages.max_contents_len,
        database = %config.storage.database_path.display(),
        "Effective configuration"
    );

    let db = Database::open(&config.storage.database_path, config.busy_timeout())?;
    if cli.reset_database {
        db.reset().await?;
    }

    let window = Arc::new(PresenceWindow::new(config.window_depth()?));
    let rotation = RotationDriver::attach(
        window.clone(),
        config.rotation_interval(),
        config.rotation_lock_timeout(),
    )?
    .spawn();

    let state = Arc::new(AppState::new(db, window, &config));
    let app = create_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on http://{}", addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        result = server => {
            result?;
            info!("Server stopped");
        }
        outcome = rotation => {
            match outcome {
                Ok(Err(e)) => error!(error = %e, "Presence rotation stopped, shutting down"),
                Ok(Ok(())) => warn!("Presence rotation exited, shutting down"),
                Err(e) => error!(error = %e, "Presence rotation task panicked"),
            }
            anyhow::bail!("presence rotation stopped");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

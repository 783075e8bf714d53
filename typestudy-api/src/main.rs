//! typestudy-api - HTTP service for the typing-study collection tool
//!
//! Issues participant identifiers, keeps per-person session counters,
//! appends to the tracking sheet and stores uploaded data bundles, all
//! inside one Google Drive folder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use typestudy_api::auth::{AccessTokenSource, TokenProvider};
use typestudy_api::drive::{DriveStore, GoogleDrive, MemoryDrive};
use typestudy_api::{build_router, AppState};
use typestudy_common::config::{
    config_file_path, load_toml_config, BackendKind, CliOverrides, ServiceConfig,
};

/// Command-line arguments for typestudy-api
#[derive(Parser, Debug)]
#[command(name = "typestudy-api")]
#[command(about = "Participant IDs, counters and uploads for the typing study")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "TYPESTUDY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:5740
    #[arg(short, long, env = "TYPESTUDY_BIND_ADDR")]
    bind: Option<String>,

    /// Drive folder holding all study data
    #[arg(short, long, env = "DRIVE_FOLDER_ID")]
    folder: Option<String>,

    /// Storage backend: google or memory
    #[arg(long, env = "TYPESTUDY_BACKEND")]
    backend: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "TYPESTUDY_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config_file_path(args.config.as_deref());
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => Default::default(),
    };

    let backend = args
        .backend
        .as_deref()
        .map(str::parse::<BackendKind>)
        .transpose()?;
    let cli = CliOverrides {
        bind_addr: args.bind,
        drive_folder_id: args.folder,
        backend,
        log_level: args.log_level,
    };
    let config = ServiceConfig::resolve(&cli, &toml_config).context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("typestudy_api={0},typestudy_common={0},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting typestudy-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let tokens = TokenProvider::from_credentials(&config.credentials)?
        .map(|provider| Arc::new(provider) as Arc<dyn AccessTokenSource>);
    if let Some(tokens) = &tokens {
        info!("Drive credentials: {}", tokens.kind());
    }

    let drive: Arc<dyn DriveStore> = match (config.backend, &tokens) {
        (BackendKind::Google, Some(tokens)) => Arc::new(GoogleDrive::new(tokens.clone())?),
        (BackendKind::Google, None) => {
            anyhow::bail!("Google backend selected but no credentials configured")
        }
        (BackendKind::Memory, _) => {
            warn!("Using in-memory storage; nothing survives a restart");
            Arc::new(MemoryDrive::new())
        }
    };
    info!("Drive folder: {}", config.drive_folder_id);

    let state = AppState::new(drive, tokens, &config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("typestudy-api listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

//! Spool Server - HTTP edge for the streaming renderer
//!
//! Maps request paths to page components, dispatches server actions and
//! streams the rendered body to the client as it is produced.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:3000, ./public)
//! spool-server
//!
//! # Custom listen address
//! spool-server --listen 0.0.0.0:8080
//!
//! # With config file
//! spool-server --config /etc/spool/spool.toml
//!
//! # Verbose logging
//! RUST_LOG=debug spool-server
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod routes;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use spool_core::{default_config_path, load_config_from_path, ConfigOverrides};

use routes::DemoStore;
use server::AppState;

/// Spool Server - streaming server-side rendering over HTTP
#[derive(Parser, Debug)]
#[command(name = "spool-server")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'L', long, env = "SPOOL_LISTEN", value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Directory served for paths without a page
    #[arg(long, env = "SPOOL_STATIC_DIR", value_name = "DIR")]
    static_dir: Option<PathBuf>,

    /// Query parameter that selects a server action
    #[arg(long, env = "SPOOL_ACTION_PARAM", value_name = "NAME")]
    action_param: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "SPOOL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SPOOL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("spool_server={level},spool_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Spool server starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    if let Some(ref config_path) = config_path {
        info!(config_path = ?config_path, "Config file");
    }
    let mut config = load_config_from_path(config_path.clone())
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    let mut overrides = ConfigOverrides::new();
    if let Some(listen) = args.listen {
        overrides = overrides.with_listen(listen);
    }
    if let Some(dir) = args.static_dir {
        overrides = overrides.with_static_dir(dir);
    }
    if let Some(param) = args.action_param {
        overrides = overrides.with_action_param(param);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;

    info!(listen = %config.listen, source = ?config.source(), "Configuration loaded");
    info!(static_dir = ?config.static_dir, "Static files");

    let store = Arc::new(DemoStore::new());
    let state = AppState::new(config.clone(), routes::pages(&store).context("Failed to build page table")?);
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(addr = %config.listen, "Listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    match result {
        Ok(()) => {
            info!("Spool server stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server stopped with error");
            Err(e.into())
        }
    }
}

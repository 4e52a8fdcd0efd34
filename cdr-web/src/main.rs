//! cdr-web - crash data refiner HTTP service
//!
//! Accepts crash data and boundary uploads, runs refinements in the
//! background and serves their logs, results and output files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdr_common::config::{
    config_file_path, ensure_directory, load_or_create_toml_config, resolve_output_root,
    user_config_path, TomlConfig,
};
use cdr_refine::{Orchestrator, RefinementConfig};
use cdr_web::AppState;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for cdr-web
#[derive(Parser, Debug)]
#[command(name = "cdr-web")]
#[command(about = "HTTP service for crash data refinement")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CDR_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(long, env = "CDR_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Directory receiving one sub-directory per run
    #[arg(short, long)]
    output_root: Option<PathBuf>,

    /// Directory for uploaded inputs; defaults to `<output root>/uploads`
    #[arg(long, env = "CDR_UPLOAD_ROOT")]
    upload_root: Option<PathBuf>,

    /// Refinement configuration (TOML or JSON)
    #[arg(short, long, env = "CDR_REFINEMENT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let toml_config = match config_file_path().or_else(user_config_path) {
        Some(path) => load_or_create_toml_config(&path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting cdr-web");
    info!(
        "Version: {} ({}, {} build, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let output_root = resolve_output_root(args.output_root.as_deref(), &toml_config);
    ensure_directory(&output_root).context("Failed to prepare output root")?;
    let upload_root = args
        .upload_root
        .clone()
        .unwrap_or_else(|| output_root.join("uploads"));
    ensure_directory(&upload_root).context("Failed to prepare upload root")?;
    info!("Output root: {}", output_root.display());
    info!("Upload root: {}", upload_root.display());

    let refinement = match args.config.as_ref().or(toml_config.refinement_config.as_ref()) {
        Some(path) => {
            info!("Refinement config: {}", path.display());
            RefinementConfig::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => RefinementConfig::default(),
    };
    refinement.resolve().context("Invalid refinement config")?;

    let orchestrator = Arc::new(Orchestrator::new(output_root));
    let state = AppState::new(
        orchestrator,
        upload_root,
        refinement,
        toml_config.max_upload_bytes,
    );
    let app = cdr_web::build_router(state);

    let bind_addr = args.bind_addr.unwrap_or(toml_config.bind_addr);
    let port = args.port.unwrap_or(toml_config.port);
    let addr: SocketAddr = format!("{bind_addr}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {bind_addr}:{port}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

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
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
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

//! csi-proxy - host storage operations for containerized workloads
//!
//! Usage:
//!   csi-proxy [--config <CONFIG>] [--bind <ADDR>] [--backend <powershell|memory>]
//!
//! Example:
//!   csi-proxy --config C:\etc\csi-proxy.toml

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use csi_proxy::config::{BackendKind, Config};
use csi_proxy::iscsi::MutualChapSecret;
use csi_proxy::os::Backend;

#[derive(Parser, Debug)]
#[command(name = "csi-proxy")]
#[command(about = "Host storage proxy: iSCSI, disk and volume APIs over loopback HTTP", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the OS backend (powershell, memory)
    #[arg(long)]
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(kind) = args.backend {
        config.backend.kind = kind;
    }

    // RUST_LOG, when set, overrides the configured level
    env_logger::Builder::new()
        .filter_level(parse_log_level(&config.server.log_level))
        .parse_default_env()
        .init();

    log::info!("csi-proxy v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        log::info!("Loaded configuration from {}", path.display());
    }

    let addr = config.server.socket_addr().context("invalid bind address")?;
    let backend = Backend::from_config(&config.backend, &config.memory);
    let dispatcher = csi_proxy::build_dispatcher(backend, MutualChapSecret::new())
        .context("failed to register API handlers")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    csi_proxy::server::serve(listener, dispatcher, shutdown_signal())
        .await
        .context("server error")?;

    log::info!("csi-proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

/// Parse log level string
fn parse_log_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => {
            eprintln!("Unknown log level '{}', defaulting to 'info'", level);
            log::LevelFilter::Info
        }
    }
}

//! csi-proxy operator CLI
//!
//! Commands:
//! - operations: List registered operations and their versions
//! - call: Dispatch one request in-process and print the JSON response

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use csi_proxy::config::Config;
use csi_proxy::iscsi::MutualChapSecret;
use csi_proxy::os::Backend;
use csi_proxy::Dispatcher;

#[derive(Parser)]
#[command(name = "csi-proxy-ctl")]
#[command(about = "Run csi-proxy operations locally", long_about = None)]
struct Cli {
    /// Configuration file selecting the backend (default: PowerShell)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PowerShell executable, when no configuration file is given
    #[arg(long, default_value = "powershell.exe")]
    powershell: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every operation with its versions, newest first
    Operations,

    /// Dispatch a single request
    Call {
        /// Operation name, e.g. ListTargetPortals
        operation: String,

        /// JSON request body
        #[arg(default_value = "{}")]
        request: String,

        /// API version to call
        #[arg(short = 'v', long, default_value = "v1")]
        api_version: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let dispatcher = build(&cli)?;

    match &cli.command {
        Commands::Operations => cmd_operations(&dispatcher),
        Commands::Call {
            operation,
            request,
            api_version,
        } => cmd_call(&dispatcher, operation, request, api_version),
    }
}

fn build(cli: &Cli) -> Result<Dispatcher> {
    let backend = match &cli.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            Backend::from_config(&config.backend, &config.memory)
        }
        None => Backend::powershell(cli.powershell.clone()),
    };
    csi_proxy::build_dispatcher(backend, MutualChapSecret::new())
        .context("failed to register API handlers")
}

fn cmd_operations(dispatcher: &Dispatcher) -> Result<()> {
    for (name, versions) in dispatcher.registry().operations() {
        let versions: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        println!("{:<28} {}", name, versions.join(", "));
    }
    Ok(())
}

fn cmd_call(dispatcher: &Dispatcher, operation: &str, request: &str, version: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(request).context("request is not valid JSON")?;

    let response = dispatcher
        .dispatch(operation, version, payload)
        .with_context(|| format!("{} {} failed", operation, version))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

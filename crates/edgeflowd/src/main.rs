//! edgeflowd — the edgeflow daemon.
//!
//! One binary, two roles:
//! - `orchestrator`: node registry, placement, deployment with retry,
//!   task status API
//! - `edge`: function host with out-of-process and wasm runtimes, idle
//!   eviction, deploy/invoke API
//!
//! # Usage
//!
//! ```text
//! edgeflowd orchestrator --config edgeflow.toml --listen 0.0.0.0:8080
//! edgeflowd edge --functions-dir /var/lib/edgeflow/functions
//! ```

mod edge_mode;
mod orchestrator_mode;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use edgeflow_core::EdgeflowConfig;

#[derive(Parser)]
#[command(name = "edgeflowd", about = "edgeflow daemon")]
struct Cli {
    /// Path to an edgeflow.toml; defaults apply when omitted.
    #[arg(long, global = true, env = "EDGEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator (placement, deployment, task status).
    Orchestrator {
        /// Address to listen on.
        #[arg(long)]
        listen: Option<String>,

        /// Bearer credential presented to edge nodes.
        #[arg(long, env = "EDGE_AUTH_TOKEN", hide_env_values = true)]
        edge_auth_token: Option<String>,
    },
    /// Run an edge node (deploy, invoke, idle eviction).
    Edge {
        /// Address to listen on.
        #[arg(long)]
        listen: Option<String>,

        /// Directory for deployed function bodies.
        #[arg(long)]
        functions_dir: Option<PathBuf>,

        /// Bearer credential callers must present.
        #[arg(long, env = "NODE_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = EdgeflowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Orchestrator {
            listen,
            edge_auth_token,
        } => {
            if let Some(listen) = listen {
                config.orchestrator.listen = listen;
            }
            if edge_auth_token.is_some() {
                config.orchestrator.edge_auth_token = edge_auth_token;
            }
            orchestrator_mode::run_orchestrator(config.orchestrator).await
        }
        Command::Edge {
            listen,
            functions_dir,
            auth_token,
        } => {
            if let Some(listen) = listen {
                config.edge.listen = listen;
            }
            if let Some(dir) = functions_dir {
                config.edge.functions_dir = dir;
            }
            if auth_token.is_some() {
                config.edge.auth_token = auth_token;
            }
            edge_mode::run_edge(config.edge).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,edgeflowd=debug,edgeflow=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves once Ctrl-C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

//! Edge mode — hosts and runs deployed functions.
//!
//! In this mode, the daemon:
//! 1. Creates the functions directory (fatal on failure)
//! 2. Starts the sandbox worker for wasm functions
//! 3. Builds the function host and its idle eviction loop
//! 4. Serves the edge API until Ctrl-C, then stops eviction

use tokio::sync::watch;
use tracing::info;

use edgeflow_core::config::EdgeConfig;
use edgeflow_host::{FunctionHost, HostConfig};
use edgeflow_sandbox::{SandboxConfig, SandboxEngine, spawn_worker};

pub async fn run_edge(config: EdgeConfig) -> anyhow::Result<()> {
    info!("edgeflow daemon starting in edge mode");

    std::fs::create_dir_all(&config.functions_dir)?;
    info!(path = %config.functions_dir.display(), "functions directory ready");

    // ── Sandbox worker ───────────────────────────────────────────
    let engine = SandboxEngine::new(SandboxConfig::from_section(&config.sandbox))?;
    let sandbox = spawn_worker(engine)?;
    info!("sandbox worker started");

    // ── Function host ────────────────────────────────────────────
    let host = FunctionHost::new(HostConfig::from_edge_config(&config), Some(sandbox));

    // ── Shutdown signal ──────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let eviction_handle = tokio::spawn({
        let host = host.clone();
        async move { host.run_eviction(shutdown_rx).await }
    });

    // ── API server ───────────────────────────────────────────────
    let router = edgeflow_api::edge_router(host, config.auth_token.clone());
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(addr = %config.listen, "edge API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            crate::shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = eviction_handle.await;

    info!("edge node stopped");
    Ok(())
}

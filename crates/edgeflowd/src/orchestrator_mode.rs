//! Orchestrator mode — places functions on edge nodes and tracks tasks.
//!
//! In this mode, the daemon:
//! 1. Registers the static node pool from config
//! 2. Builds the deployment coordinator over an HTTP deploy client
//! 3. Serves the orchestrator API until Ctrl-C

use std::sync::Arc;

use tracing::info;

use edgeflow_core::config::OrchestratorConfig;
use edgeflow_placement::NodeRegistry;
use edgeflow_scheduler::{DeploymentCoordinator, HttpDeployClient, RetryPolicy};

pub async fn run_orchestrator(config: OrchestratorConfig) -> anyhow::Result<()> {
    info!("edgeflow daemon starting in orchestrator mode");

    // ── Node registry ────────────────────────────────────────────
    let registry = NodeRegistry::new();
    for node in &config.nodes {
        registry.register(node.to_edge_node()).await;
    }
    info!(nodes = config.nodes.len(), "static node pool registered");

    // ── Deployment coordinator ───────────────────────────────────
    let client = HttpDeployClient::new(config.edge_auth_token.clone(), config.deploy_timeout());
    let retry = RetryPolicy::from(&config.retry);
    let coordinator = DeploymentCoordinator::new(registry, Arc::new(client)).with_retry_policy(retry);
    info!(
        max_retries = retry.max_retries,
        base_delay_ms = retry.base_delay.as_millis() as u64,
        "deployment coordinator initialized"
    );

    // ── API server ───────────────────────────────────────────────
    let router = edgeflow_api::orchestrator_router(coordinator, config.api_token.clone());
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(addr = %config.listen, "orchestrator API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(crate::shutdown_signal())
        .await?;

    info!("orchestrator stopped");
    Ok(())
}

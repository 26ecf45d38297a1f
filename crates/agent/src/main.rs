//! Cluster State Agent
//!
//! Runs a single replica in the cluster, mirroring nodes and pods into the
//! cluster state cache and serving the cache over HTTP.

use anyhow::{Context, Result};
use cluster_state::{
    health::{components, HealthRegistry},
    Clock, Cluster, KubeSource, NodeStartupTracker, StateMetrics, StructuredLogger, SystemClock,
};
use cluster_state_agent::{api, config::AgentConfig, controllers::Reconciler, observers};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = AgentConfig::load()?;

    // Initialize tracing with env filter, JSON unless disabled
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    if config.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!(
        cluster = %config.cluster_name,
        api_port = config.api_port,
        source_timeout_secs = config.source_timeout_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::NODE_WATCHER).await;
    health_registry.register(components::POD_WATCHER).await;

    let metrics = StateMetrics::new();
    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(AGENT_VERSION);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let source = Arc::new(KubeSource::new(client.clone()));
    let cluster = Arc::new(Cluster::with_config(
        clock.clone(),
        source,
        config.cluster_config(),
    ));
    health_registry.mark_synced(components::STORE).await;

    let startup = Arc::new(NodeStartupTracker::new(clock));
    observers::register_event_metrics(&cluster, metrics.clone());
    observers::register_startup_tracking(&cluster, startup.clone(), metrics, logger.clone());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        cluster.clone(),
        startup,
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let reconciler = Reconciler::new(cluster, health_registry, logger.clone());
    let node_handle = tokio::spawn(reconciler.clone().run_nodes(client.clone()));
    let pod_handle = tokio::spawn(reconciler.run_pods(client));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            result??;
            logger.log_shutdown("API server stopped");
        }
    }
    node_handle.abort();
    pod_handle.abort();
    info!("Shutting down");

    Ok(())
}

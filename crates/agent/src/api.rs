//! HTTP API for health checks, Prometheus metrics and cache views

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use cluster_state::{
    health::{ComponentStatus, HealthRegistry},
    Cluster, ClusterSummary, NodeStartupTracker, NodeSummary, PodSummary,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub cluster: Arc<Cluster>,
    pub startup: Arc<NodeStartupTracker>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        cluster: Arc<Cluster>,
        startup: Arc<NodeStartupTracker>,
    ) -> Self {
        Self {
            health_registry,
            cluster,
            startup,
        }
    }
}

/// A node with the pods attributed to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetail {
    #[serde(flatten)]
    pub node: NodeSummary,
    pub pods: Vec<PodSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the initial sync completed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn cluster_summary(State(state): State<Arc<AppState>>) -> Json<ClusterSummary> {
    let mut summary = state.cluster.summary().await;
    summary.startup = state.startup.stats();
    Json(summary)
}

async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<Vec<NodeSummary>> {
    let mut nodes = Vec::new();
    state
        .cluster
        .for_each_node(|node| {
            nodes.push(node.summary());
            true
        })
        .await;
    Json(nodes)
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<NodeDetail>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state.cluster.node(&name).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("node {name} is not tracked"),
            }),
        )
    })?;

    let pods = snapshot
        .sorted_pods()
        .into_iter()
        .map(PodSummary::of)
        .collect();
    Ok(Json(NodeDetail {
        node: snapshot.summary(),
        pods,
    }))
}

async fn list_unbound_pods(State(state): State<Arc<AppState>>) -> Json<Vec<PodSummary>> {
    let mut pods = Vec::new();
    state
        .cluster
        .for_each_unbound_pod(|pod| {
            pods.push(PodSummary::of(pod));
            true
        })
        .await;
    Json(pods)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/cluster", get(cluster_summary))
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/nodes/:name", get(get_node))
        .route("/api/v1/pods/unbound", get(list_unbound_pods))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Health tracking for the cache and the watchers that feed it
//!
//! Liveness reflects component status. Readiness additionally requires
//! every registered watcher to have completed its initial sync, since the
//! cache is incomplete until then.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, e.g. a watcher retrying after an error
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub synced: bool,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, synced: bool) -> Self {
        Self {
            status,
            message,
            synced,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const STORE: &str = "store";
    pub const NODE_WATCHER: &str = "node_watcher";
    pub const POD_WATCHER: &str = "pod_watcher";
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    synced: Arc<RwLock<HashSet<String>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy and not yet synced
    pub async fn register(&self, name: &str) {
        self.synced.write().await.remove(name);
        self.components.write().await.insert(
            name.to_string(),
            ComponentHealth::new(ComponentStatus::Healthy, None, false),
        );
    }

    async fn update(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let synced = self.synced.read().await.contains(name);
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::new(status, message, synced));
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Record that a component finished its initial listing
    pub async fn mark_synced(&self, name: &str) {
        self.synced.write().await.insert(name.to_string());
        if let Some(health) = self.components.write().await.get_mut(name) {
            health.synced = true;
            health.last_check_timestamp = chrono::Utc::now().timestamp();
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;

        let mut pending: Vec<&str> = health
            .components
            .iter()
            .filter(|(_, c)| !c.synced)
            .map(|(name, _)| name.as_str())
            .collect();
        pending.sort_unstable();

        if health.components.is_empty() {
            ReadinessResponse {
                ready: false,
                reason: Some("No components registered".to_string()),
            }
        } else if !pending.is_empty() {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Waiting for initial sync: {}", pending.join(", "))),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

//! Watch-driven reconcilers feeding the cluster store
//!
//! Each reconciler consumes a kube watcher stream. Applied objects are
//! upserted, deleted objects removed, and a restarted stream triggers a
//! full resync against the listed objects. Store errors are logged and the
//! reconciler moves on to the next event; the latest outcome is reported as
//! the store component's health.

use cluster_state::health::components;
use cluster_state::{Cluster, HealthRegistry, PodKey, StructuredLogger};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::Api;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared handles used by both reconcilers
#[derive(Clone)]
pub struct Reconciler {
    pub cluster: Arc<Cluster>,
    pub health: HealthRegistry,
    pub logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(cluster: Arc<Cluster>, health: HealthRegistry, logger: StructuredLogger) -> Self {
        Self {
            cluster,
            health,
            logger,
        }
    }

    /// Watch nodes until the stream ends
    pub async fn run_nodes(self, client: Client) {
        let api: Api<Node> = Api::all(client);
        let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
        info!("Starting node watcher");

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    self.health.set_healthy(components::NODE_WATCHER).await;
                    self.apply_node_event(event).await;
                }
                Err(e) => {
                    warn!(error = %e, "Node watch failed, retrying");
                    self.health
                        .set_degraded(components::NODE_WATCHER, e.to_string())
                        .await;
                }
            }
        }
        self.health
            .set_unhealthy(components::NODE_WATCHER, "watch stream ended")
            .await;
    }

    /// Watch pods in every namespace until the stream ends
    pub async fn run_pods(self, client: Client) {
        let api: Api<Pod> = Api::all(client);
        let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
        info!("Starting pod watcher");

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    self.health.set_healthy(components::POD_WATCHER).await;
                    self.apply_pod_event(event).await;
                }
                Err(e) => {
                    warn!(error = %e, "Pod watch failed, retrying");
                    self.health
                        .set_degraded(components::POD_WATCHER, e.to_string())
                        .await;
                }
            }
        }
        self.health
            .set_unhealthy(components::POD_WATCHER, "watch stream ended")
            .await;
    }

    pub async fn apply_node_event(&self, event: watcher::Event<Node>) {
        match event {
            watcher::Event::Applied(node) => self.update_node(node).await,
            watcher::Event::Deleted(node) => {
                let name = node.metadata.name.unwrap_or_default();
                self.cluster.delete_node(&name).await;
            }
            watcher::Event::Restarted(nodes) => {
                let live: HashSet<String> = nodes
                    .iter()
                    .filter_map(|n| n.metadata.name.clone())
                    .collect();
                for node in nodes {
                    self.update_node(node).await;
                }

                let mut removed = 0;
                for name in self.cluster.node_names().await {
                    if !live.contains(&name) {
                        self.cluster.delete_node(&name).await;
                        removed += 1;
                    }
                }
                self.logger.log_resync("Node", live.len(), removed);
                self.health.mark_synced(components::NODE_WATCHER).await;
            }
        }
    }

    pub async fn apply_pod_event(&self, event: watcher::Event<Pod>) {
        match event {
            watcher::Event::Applied(pod) => self.update_pod(pod).await,
            watcher::Event::Deleted(pod) => {
                self.cluster.delete_pod(&PodKey::from_pod(&pod)).await;
            }
            watcher::Event::Restarted(pods) => {
                let live: HashSet<PodKey> = pods.iter().map(PodKey::from_pod).collect();
                for pod in pods {
                    self.update_pod(pod).await;
                }

                let mut removed = 0;
                for key in self.cluster.known_pods().await {
                    if !live.contains(&key) {
                        self.cluster.delete_pod(&key).await;
                        removed += 1;
                    }
                }
                self.logger.log_resync("Pod", live.len(), removed);
                self.health.mark_synced(components::POD_WATCHER).await;
            }
        }
    }

    async fn update_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        match self.cluster.update_node(node).await {
            Ok(()) => self.health.set_healthy(components::STORE).await,
            Err(e) => {
                warn!(node = %name, error = %e, "Failed to update node");
                self.health
                    .set_degraded(components::STORE, e.to_string())
                    .await;
            }
        }
    }

    async fn update_pod(&self, pod: Pod) {
        let key = PodKey::from_pod(&pod);
        match self.cluster.update_pod(pod).await {
            Ok(()) => self.health.set_healthy(components::STORE).await,
            Err(e) => {
                warn!(pod = %key, error = %e, "Failed to update pod");
                self.health
                    .set_degraded(components::STORE, e.to_string())
                    .await;
            }
        }
    }
}

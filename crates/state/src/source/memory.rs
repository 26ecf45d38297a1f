use super::ClusterSource;
use crate::error::SourceError;
use crate::pods::{self, PodKey};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::storage::v1::CSINode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Default)]
struct Objects {
    nodes: HashMap<String, Node>,
    pods: HashMap<PodKey, Pod>,
    csi_nodes: HashMap<String, CSINode>,
    failing_listings: HashSet<String>,
    failing_node_lookups: HashSet<String>,
    failing_csi_lookups: HashSet<String>,
    latency: Option<Duration>,
}

/// In-memory data source with failure and latency injection
#[derive(Debug, Default)]
pub struct MemorySource {
    objects: RwLock<Objects>,
    listings: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Objects> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Objects> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.write().nodes.insert(name, node);
    }

    pub fn remove_node(&self, name: &str) {
        self.write().nodes.remove(name);
    }

    pub fn put_pod(&self, pod: Pod) {
        self.write().pods.insert(PodKey::from_pod(&pod), pod);
    }

    pub fn remove_pod(&self, key: &PodKey) {
        self.write().pods.remove(key);
    }

    pub fn put_csi_node(&self, csi_node: CSINode) {
        let name = csi_node.metadata.name.clone().unwrap_or_default();
        self.write().csi_nodes.insert(name, csi_node);
    }

    /// Make pod listings for a node fail until cleared
    pub fn fail_pod_listing(&self, node_name: &str, fail: bool) {
        toggle(&mut self.write().failing_listings, node_name, fail);
    }

    pub fn fail_node_lookup(&self, node_name: &str, fail: bool) {
        toggle(&mut self.write().failing_node_lookups, node_name, fail);
    }

    pub fn fail_csi_lookup(&self, node_name: &str, fail: bool) {
        toggle(&mut self.write().failing_csi_lookups, node_name, fail);
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.write().latency = latency;
    }

    /// Number of pod listings served so far
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::Relaxed)
    }

    async fn delay(&self) {
        let latency = self.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn toggle(set: &mut HashSet<String>, name: &str, on: bool) {
    if on {
        set.insert(name.to_string());
    } else {
        set.remove(name);
    }
}

#[async_trait]
impl ClusterSource for MemorySource {
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, SourceError> {
        self.delay().await;
        self.listings.fetch_add(1, Ordering::Relaxed);
        let objects = self.read();
        if objects.failing_listings.contains(node_name) {
            return Err(SourceError::ListPods {
                node: node_name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(objects
            .pods
            .values()
            .filter(|pod| pods::node_name(pod) == Some(node_name))
            .cloned()
            .collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, SourceError> {
        self.delay().await;
        let objects = self.read();
        if objects.failing_node_lookups.contains(name) {
            return Err(SourceError::GetNode {
                node: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(objects.nodes.get(name).cloned())
    }

    async fn get_csi_node(&self, name: &str) -> Result<Option<CSINode>, SourceError> {
        self.delay().await;
        let objects = self.read();
        if objects.failing_csi_lookups.contains(name) {
            return Err(SourceError::GetCsiNode {
                node: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(objects.csi_nodes.get(name).cloned())
    }
}

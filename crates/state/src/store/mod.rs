//! Cluster store
//!
//! Holds every node snapshot and the binding table behind one async
//! reader/writer lock. Mutations take the write lock for their whole
//! duration, data-source calls included, so concurrent events for the same
//! node never interleave. Observers run after the lock is released and
//! before the mutating call returns.

use crate::bindings::BindingTable;
use crate::clock::Clock;
use crate::error::{SourceError, StateError};
use crate::nodes::{self, NodeStatus};
use crate::notify::{ClusterEvent, EventAction, ObserverId, ObserverRegistry};
use crate::observability::{StateMetrics, StructuredLogger};
use crate::pods::{self, PodKey};
use crate::resources;
use crate::snapshot::{self, ClusterSummary, NodeSnapshot};
use crate::source::ClusterSource;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};


#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Upper bound on every data-source call
    pub source_timeout: Duration,
    /// Name used in structured logs
    pub cluster_name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(30),
            cluster_name: "default".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: HashMap<String, NodeSnapshot>,
    bindings: BindingTable,
}

impl ClusterState {
    /// Install a snapshot, re-pointing bindings at it. Returns whether an
    /// entry for the node already existed.
    fn install(&mut self, snapshot: NodeSnapshot) -> bool {
        let name = snapshot.name().to_string();

        for key in self.bindings.pods_on(&name) {
            if !snapshot.contains_pod(&key) {
                self.bindings.unbind(&key);
            }
        }
        for key in snapshot.pods().keys() {
            if let Some(previous) = self.bindings.bind(key.clone(), name.as_str()) {
                if previous != name {
                    if let Some(other) = self.nodes.get_mut(&previous) {
                        other.remove_pod(key);
                    }
                }
            }
        }

        self.nodes.insert(name, snapshot).is_some()
    }

    /// Drop a node and its bindings. Returns whether it was tracked.
    fn evict(&mut self, name: &str) -> bool {
        self.bindings.unbind_node(name);
        self.nodes.remove(name).is_some()
    }

    /// Reverse a pod's contribution wherever it is tracked
    fn forget_pod(&mut self, key: &PodKey) -> bool {
        if let Some(node_name) = self.bindings.unbind(key) {
            if let Some(snapshot) = self.nodes.get_mut(&node_name) {
                snapshot.remove_pod(key);
            }
            return true;
        }
        self.bindings.remove_unbound(key).is_some()
    }
}

/// Derived, queryable view of the cluster's nodes and the pods bound to them
pub struct Cluster {
    clock: Arc<dyn Clock>,
    source: Arc<dyn ClusterSource>,
    config: ClusterConfig,
    state: RwLock<ClusterState>,
    observers: ObserverRegistry,
    metrics: StateMetrics,
    logger: StructuredLogger,
    // unix millis, zero when unset
    last_node_creation: AtomicI64,
    last_node_deletion: AtomicI64,
    last_updated: AtomicI64,
}

impl Cluster {
    pub fn new(clock: Arc<dyn Clock>, source: Arc<dyn ClusterSource>) -> Self {
        Self::with_config(clock, source, ClusterConfig::default())
    }

    pub fn with_config(
        clock: Arc<dyn Clock>,
        source: Arc<dyn ClusterSource>,
        config: ClusterConfig,
    ) -> Self {
        let logger = StructuredLogger::new(config.cluster_name.clone());
        Self {
            clock,
            source,
            config,
            state: RwLock::new(ClusterState::default()),
            observers: ObserverRegistry::default(),
            metrics: StateMetrics::new(),
            logger,
            last_node_creation: AtomicI64::new(0),
            last_node_deletion: AtomicI64::new(0),
            last_updated: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Register a callback run once per state change
    pub fn add_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ClusterEvent) + Send + Sync + 'static,
    {
        self.observers.add(Arc::new(observer))
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Rebuild a node's snapshot from the data source and replace any
    /// existing entry. On failure the stale entry is evicted.
    pub async fn update_node(&self, node: Node) -> Result<(), StateError> {
        let name = node.metadata.name.clone().unwrap_or_default();
        let descriptor = Arc::new(node.clone());

        let mut state = self.state.write().await;
        let (event, result) = match self.build_node(node).await {
            Ok(snapshot) => {
                self.record_node_times(snapshot.node());
                let action = if state.install(snapshot) {
                    EventAction::Update
                } else {
                    EventAction::Create
                };
                let event = ClusterEvent::Node {
                    action,
                    name,
                    node: Some(descriptor),
                };
                (Some(event), Ok(()))
            }
            Err(err) => {
                let evicted = state.evict(&name);
                self.logger
                    .log_build_failed(&name, &err.to_string(), evicted);
                let event = evicted.then(|| ClusterEvent::Node {
                    action: EventAction::Delete,
                    name,
                    node: Some(descriptor),
                });
                (event, Err(err))
            }
        };
        self.after_write(&state, event.is_some());
        drop(state);

        if let Some(event) = event {
            self.notify(event).await;
        }
        result
    }

    /// Remove a node and every binding to it
    pub async fn delete_node(&self, name: &str) {
        let mut state = self.state.write().await;
        let removed = state.evict(name);
        self.after_write(&state, removed);
        drop(state);

        if removed {
            debug!(node = %name, "Removed node from cache");
            self.notify(ClusterEvent::Node {
                action: EventAction::Delete,
                name: name.to_string(),
                node: None,
            })
            .await;
        }
    }

    /// Apply a pod event. Terminal pods are removed, pods without a node
    /// enter the unbound set, and pods on an untracked node cause that node
    /// to be built first.
    pub async fn update_pod(&self, pod: Pod) -> Result<(), StateError> {
        let key = PodKey::from_pod(&pod);
        let descriptor = Arc::new(pod.clone());

        let mut state = self.state.write().await;
        let known = state.bindings.is_known(&key);

        let action = if pods::is_terminal(&pod) {
            state.forget_pod(&key).then_some(EventAction::Delete)
        } else {
            match pods::node_name(&pod).map(str::to_string) {
                None => {
                    if let Some(previous) = state.bindings.mark_unbound(key.clone(), pod) {
                        if let Some(snapshot) = state.nodes.get_mut(&previous) {
                            snapshot.remove_pod(&key);
                        }
                        self.logger
                            .log_pod_moved(&key.to_string(), Some(previous.as_str()), None);
                    }
                    Some(if known {
                        EventAction::Update
                    } else {
                        EventAction::Create
                    })
                }
                Some(node_name) => {
                    // leave the previous node before the target can fail to build
                    let moved_from = state
                        .bindings
                        .node_of(&key)
                        .filter(|previous| *previous != node_name)
                        .map(str::to_string);
                    if let Some(previous) = moved_from.as_deref() {
                        state.forget_pod(&key);
                        self.logger.log_pod_moved(
                            &key.to_string(),
                            Some(previous),
                            Some(node_name.as_str()),
                        );
                    }

                    if !state.nodes.contains_key(&node_name) {
                        match self.build_on_demand(&node_name).await {
                            Ok(snapshot) => {
                                state.install(snapshot);
                            }
                            Err(err) => {
                                let left = moved_from.is_some();
                                self.after_write(&state, left);
                                drop(state);
                                if left {
                                    self.notify(ClusterEvent::Pod {
                                        action: EventAction::Delete,
                                        key,
                                        pod: Some(descriptor),
                                    })
                                    .await;
                                }
                                return Err(err);
                            }
                        }
                    }

                    state.bindings.bind(key.clone(), node_name.as_str());
                    if let Some(snapshot) = state.nodes.get_mut(&node_name) {
                        snapshot.add_pod(key.clone(), pod);
                    }
                    Some(if known {
                        EventAction::Update
                    } else {
                        EventAction::Create
                    })
                }
            }
        };
        self.after_write(&state, action.is_some());
        drop(state);

        if let Some(action) = action {
            self.notify(ClusterEvent::Pod {
                action,
                key,
                pod: Some(descriptor),
            })
            .await;
        }
        Ok(())
    }

    /// Remove a pod from accounting. Unknown pods are a no-op.
    pub async fn delete_pod(&self, key: &PodKey) {
        let mut state = self.state.write().await;
        let removed = state.forget_pod(key);
        self.after_write(&state, removed);
        drop(state);

        if removed {
            self.notify(ClusterEvent::Pod {
                action: EventAction::Delete,
                key: key.clone(),
                pod: None,
            })
            .await;
        }
    }

    /// Visit nodes ordered by creation time, then UID, until `visit` returns false
    pub async fn for_each_node<F>(&self, mut visit: F)
    where
        F: FnMut(&NodeSnapshot) -> bool,
    {
        let state = self.state.read().await;
        let mut nodes: Vec<&NodeSnapshot> = state.nodes.values().collect();
        nodes.sort_by(|a, b| snapshot::node_order(a, b));
        for node in nodes {
            if !visit(node) {
                break;
            }
        }
    }

    /// Visit unbound pods ordered by creation time, then UID, until `visit` returns false
    pub async fn for_each_unbound_pod<F>(&self, mut visit: F)
    where
        F: FnMut(&Pod) -> bool,
    {
        let state = self.state.read().await;
        let mut unbound: Vec<&Pod> = state.bindings.unbound_pods().collect();
        unbound.sort_by(|a, b| snapshot::pod_order(a, b));
        for pod in unbound {
            if !visit(pod) {
                break;
            }
        }
    }

    pub async fn nodes(&self) -> Vec<NodeSnapshot> {
        let mut nodes = Vec::new();
        self.for_each_node(|node| {
            nodes.push(node.clone());
            true
        })
        .await;
        nodes
    }

    pub async fn node(&self, name: &str) -> Option<NodeSnapshot> {
        self.state.read().await.nodes.get(name).cloned()
    }

    pub async fn unbound_pods(&self) -> Vec<Pod> {
        let mut unbound = Vec::new();
        self.for_each_unbound_pod(|pod| {
            unbound.push(pod.clone());
            true
        })
        .await;
        unbound
    }

    /// Node the pod is currently attributed to
    pub async fn binding(&self, key: &PodKey) -> Option<String> {
        self.state
            .read()
            .await
            .bindings
            .node_of(key)
            .map(str::to_string)
    }

    pub async fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every pod the cache knows, bound or unbound
    pub async fn known_pods(&self) -> Vec<PodKey> {
        let state = self.state.read().await;
        let mut keys: Vec<PodKey> = state
            .bindings
            .bound_keys()
            .chain(state.bindings.unbound_keys())
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub async fn summary(&self) -> ClusterSummary {
        let state = self.state.read().await;
        let nodes = state.nodes.values();
        ClusterSummary {
            node_count: state.nodes.len(),
            ready_node_count: state
                .nodes
                .values()
                .filter(|n| n.status() == NodeStatus::Ready)
                .count(),
            bound_pod_count: state.bindings.bound_count(),
            unbound_pod_count: state.bindings.unbound_count(),
            allocatable: resources::merge(nodes.clone().map(NodeSnapshot::allocatable)),
            pod_total_requests: resources::merge(
                nodes.clone().map(NodeSnapshot::pod_total_requests),
            ),
            daemon_set_requested: resources::merge(nodes.map(NodeSnapshot::daemon_set_requested)),
            last_node_creation: self.last_node_creation_time(),
            last_node_deletion: self.last_node_deletion_time(),
            last_updated: self.last_updated(),
            startup: None,
        }
    }

    /// Latest creation timestamp among nodes seen so far
    pub fn last_node_creation_time(&self) -> Option<DateTime<Utc>> {
        from_millis(self.last_node_creation.load(Ordering::Acquire))
    }

    /// Latest deletion timestamp among nodes seen so far
    pub fn last_node_deletion_time(&self) -> Option<DateTime<Utc>> {
        from_millis(self.last_node_deletion.load(Ordering::Acquire))
    }

    /// Clock time of the last state change
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        from_millis(self.last_updated.load(Ordering::Acquire))
    }

    async fn build_node(&self, node: Node) -> Result<NodeSnapshot, StateError> {
        let name = node.metadata.name.clone().unwrap_or_default();
        let started = Instant::now();

        let (listing, csi_node) = tokio::join!(
            self.timed(
                format!("listing pods on node {name}"),
                self.source.list_pods_on_node(&name)
            ),
            self.timed(
                format!("getting CSINode {name}"),
                self.source.get_csi_node(&name)
            ),
        );

        let mut errors = Vec::new();
        let assigned = listing.unwrap_or_else(|e| {
            errors.push(e);
            Vec::new()
        });
        let csi_node = csi_node.unwrap_or_else(|e| {
            errors.push(e);
            None
        });
        if !errors.is_empty() {
            self.metrics.inc_snapshot_build_failures();
            return Err(StateError::NodeBuild { node: name, errors });
        }

        let mut snapshot = NodeSnapshot::build(node, assigned, self.clock.now());
        if let Some(csi_node) = csi_node {
            snapshot.set_volume_limits(&csi_node);
        }

        let elapsed = started.elapsed();
        self.metrics.observe_snapshot_build(elapsed.as_secs_f64());
        self.logger
            .log_node_built(&name, snapshot.pods().len(), elapsed.as_millis() as u64);
        Ok(snapshot)
    }

    /// Build a node referenced by a pod event before its own event arrived
    async fn build_on_demand(&self, name: &str) -> Result<NodeSnapshot, StateError> {
        let node = self
            .timed(format!("getting node {name}"), self.source.get_node(name))
            .await?;
        let node = match node {
            Some(node) => node,
            None => {
                info!(node = %name, "Node not found, tracking placeholder until its event arrives");
                nodes::placeholder(name)
            }
        };
        self.build_node(node).await
    }

    async fn timed<T, F>(&self, operation: String, call: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let timeout = self.config.source_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| SourceError::Timeout { operation, timeout })?
    }

    fn record_node_times(&self, node: &Node) {
        if let Some(created) = node.metadata.creation_timestamp.as_ref() {
            self.last_node_creation
                .fetch_max(created.0.timestamp_millis(), Ordering::AcqRel);
        }
        if let Some(deleted) = node.metadata.deletion_timestamp.as_ref() {
            self.last_node_deletion
                .fetch_max(deleted.0.timestamp_millis(), Ordering::AcqRel);
        }
    }

    fn after_write(&self, state: &ClusterState, changed: bool) {
        if changed {
            self.last_updated
                .store(self.clock.now().timestamp_millis(), Ordering::Release);
        }
        self.metrics.set_tracked(
            state.nodes.len(),
            state.bindings.bound_count(),
            state.bindings.unbound_count(),
        );
    }

    async fn notify(&self, event: ClusterEvent) {
        self.observers.notify(event, &self.metrics).await;
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        None
    } else {
        DateTime::from_timestamp_millis(millis)
    }
}

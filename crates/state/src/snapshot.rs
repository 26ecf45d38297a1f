//! Per-node resource snapshots and the serializable views built from them
//!
//! A `NodeSnapshot` caches aggregates that would otherwise need a scan over
//! every pod on the node. Pods enter and leave through `add_pod` and
//! `remove_pod`, which adjust the aggregates by the pod's own usage only.

use crate::nodes::{self, NodeStatus};
use crate::pods::{self, PodKey};
use crate::resources::{self, ResourceList};
use crate::startup::StartupStats;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::storage::v1::CSINode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Usage recorded when a pod was attributed, so it can be reversed exactly
#[derive(Debug, Clone)]
struct PodUsage {
    requests: ResourceList,
    limits: ResourceList,
    daemon_set: bool,
}

impl PodUsage {
    fn of(pod: &Pod) -> Self {
        Self {
            requests: pods::requests_for_pod(pod),
            limits: pods::limits_for_pod(pod),
            daemon_set: pods::is_owned_by_daemon_set(pod),
        }
    }
}

/// Cached aggregate state for one node
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    node: Node,
    pods: HashMap<PodKey, Pod>,
    usage: HashMap<PodKey, PodUsage>,
    capacity: ResourceList,
    allocatable: ResourceList,
    available: ResourceList,
    pod_total_requests: ResourceList,
    pod_total_limits: ResourceList,
    daemon_set_requested: ResourceList,
    daemon_set_limits: ResourceList,
    volume_limits: BTreeMap<String, i32>,
    observed_at: DateTime<Utc>,
}

impl NodeSnapshot {
    /// Build a snapshot from a node and the pods currently assigned to it.
    /// Terminal pods are skipped.
    pub(crate) fn build(node: Node, assigned: Vec<Pod>, observed_at: DateTime<Utc>) -> Self {
        let status = node.status.as_ref();
        let capacity = status
            .and_then(|s| s.capacity.as_ref())
            .map(ResourceList::from_quantities)
            .unwrap_or_default();
        let allocatable = status
            .and_then(|s| s.allocatable.as_ref())
            .map(ResourceList::from_quantities)
            .unwrap_or_default();

        let mut pods = HashMap::new();
        let mut usage = HashMap::new();
        for pod in assigned.into_iter().filter(|p| !pods::is_terminal(p)) {
            let key = PodKey::from_pod(&pod);
            usage.insert(key.clone(), PodUsage::of(&pod));
            pods.insert(key, pod);
        }

        let pod_total_requests = resources::merge(usage.values().map(|u| &u.requests));
        let pod_total_limits = resources::merge(usage.values().map(|u| &u.limits));
        let daemon_sets = || usage.values().filter(|u| u.daemon_set);
        let daemon_set_requested = resources::merge(daemon_sets().map(|u| &u.requests));
        let daemon_set_limits = resources::merge(daemon_sets().map(|u| &u.limits));
        let available = resources::subtract(&allocatable, &pod_total_requests);

        Self {
            node,
            pods,
            usage,
            capacity,
            allocatable,
            available,
            pod_total_requests,
            pod_total_limits,
            daemon_set_requested,
            daemon_set_limits,
            volume_limits: BTreeMap::new(),
            observed_at,
        }
    }

    /// Record per-driver attachable volume counts from the node's CSINode
    pub(crate) fn set_volume_limits(&mut self, csi_node: &CSINode) {
        self.volume_limits = csi_node
            .spec
            .drivers
            .iter()
            .filter_map(|driver| {
                let count = driver.allocatable.as_ref()?.count?;
                Some((driver.name.clone(), count))
            })
            .collect();
    }

    /// Attribute a pod to this node. Returns false if it was already present,
    /// in which case only the stored descriptor is refreshed.
    pub(crate) fn add_pod(&mut self, key: PodKey, pod: Pod) -> bool {
        if let Some(existing) = self.pods.get_mut(&key) {
            *existing = pod;
            return false;
        }

        let usage = PodUsage::of(&pod);
        self.pod_total_requests = resources::merge([&self.pod_total_requests, &usage.requests]);
        self.pod_total_limits = resources::merge([&self.pod_total_limits, &usage.limits]);
        if usage.daemon_set {
            self.daemon_set_requested =
                resources::merge([&self.daemon_set_requested, &usage.requests]);
            self.daemon_set_limits = resources::merge([&self.daemon_set_limits, &usage.limits]);
        }
        self.available = resources::subtract(&self.allocatable, &self.pod_total_requests);
        self.usage.insert(key.clone(), usage);
        self.pods.insert(key, pod);
        true
    }

    /// Reverse a pod's contribution, including daemon-set aggregates
    pub(crate) fn remove_pod(&mut self, key: &PodKey) -> Option<Pod> {
        let pod = self.pods.remove(key)?;
        if let Some(usage) = self.usage.remove(key) {
            self.pod_total_requests = resources::subtract(&self.pod_total_requests, &usage.requests);
            self.pod_total_limits = resources::subtract(&self.pod_total_limits, &usage.limits);
            if usage.daemon_set {
                self.daemon_set_requested =
                    resources::subtract(&self.daemon_set_requested, &usage.requests);
                self.daemon_set_limits = resources::subtract(&self.daemon_set_limits, &usage.limits);
            }
            // only allocatable resources are tracked as available
            self.available = resources::subtract(&self.allocatable, &self.pod_total_requests);
        }
        Some(pod)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn name(&self) -> &str {
        self.node.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn uid(&self) -> &str {
        self.node.metadata.uid.as_deref().unwrap_or_default()
    }

    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.node.metadata.creation_timestamp.as_ref().map(|t| t.0)
    }

    pub fn status(&self) -> NodeStatus {
        nodes::ready_status(&self.node)
    }

    pub fn pods(&self) -> &HashMap<PodKey, Pod> {
        &self.pods
    }

    pub fn contains_pod(&self, key: &PodKey) -> bool {
        self.pods.contains_key(key)
    }

    pub fn capacity(&self) -> &ResourceList {
        &self.capacity
    }

    pub fn allocatable(&self) -> &ResourceList {
        &self.allocatable
    }

    /// Allocatable minus everything requested by pods on the node
    pub fn available(&self) -> &ResourceList {
        &self.available
    }

    pub fn pod_total_requests(&self) -> &ResourceList {
        &self.pod_total_requests
    }

    pub fn pod_total_limits(&self) -> &ResourceList {
        &self.pod_total_limits
    }

    /// Requests of daemon-set pods; already included in `available`
    pub fn daemon_set_requested(&self) -> &ResourceList {
        &self.daemon_set_requested
    }

    pub fn daemon_set_limits(&self) -> &ResourceList {
        &self.daemon_set_limits
    }

    /// Attachable volumes per CSI driver
    pub fn volume_limits(&self) -> &BTreeMap<String, i32> {
        &self.volume_limits
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Fraction of allocatable requested for a resource, if any is allocatable
    pub fn utilization(&self, resource: &str) -> Option<f64> {
        let allocatable = self.allocatable.get(resource);
        (allocatable > 0)
            .then(|| self.pod_total_requests.get(resource) as f64 / allocatable as f64)
    }

    /// Pods sorted by creation time, then UID
    pub fn sorted_pods(&self) -> Vec<&Pod> {
        let mut pods: Vec<&Pod> = self.pods.values().collect();
        pods.sort_by(|a, b| pod_order(a, b));
        pods
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: self.name().to_string(),
            uid: self.uid().to_string(),
            status: self.status(),
            created_at: self.creation_timestamp(),
            instance_type: nodes::instance_type(&self.node).map(str::to_string),
            capacity_type: nodes::capacity_type(&self.node).map(str::to_string),
            pod_count: self.pods.len(),
            daemon_set_pod_count: self.usage.values().filter(|u| u.daemon_set).count(),
            capacity: self.capacity.clone(),
            allocatable: self.allocatable.clone(),
            available: self.available.clone(),
            pod_total_requests: self.pod_total_requests.clone(),
            pod_total_limits: self.pod_total_limits.clone(),
            daemon_set_requested: self.daemon_set_requested.clone(),
            daemon_set_limits: self.daemon_set_limits.clone(),
            volume_limits: self.volume_limits.clone(),
            observed_at: self.observed_at,
        }
    }
}

/// Creation time ascending, ties broken by UID then name
pub(crate) fn pod_order(a: &Pod, b: &Pod) -> std::cmp::Ordering {
    let created = |p: &Pod| pods::creation_timestamp(p).map(|t| t.0);
    created(a)
        .cmp(&created(b))
        .then_with(|| a.metadata.uid.cmp(&b.metadata.uid))
        .then_with(|| PodKey::from_pod(a).cmp(&PodKey::from_pod(b)))
}

pub(crate) fn node_order(a: &NodeSnapshot, b: &NodeSnapshot) -> std::cmp::Ordering {
    a.creation_timestamp()
        .cmp(&b.creation_timestamp())
        .then_with(|| a.uid().cmp(b.uid()))
        .then_with(|| a.name().cmp(b.name()))
}

/// Serializable view of a node snapshot; quantities are milli-units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    pub uid: String,
    pub status: NodeStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub instance_type: Option<String>,
    pub capacity_type: Option<String>,
    pub pod_count: usize,
    pub daemon_set_pod_count: usize,
    pub capacity: ResourceList,
    pub allocatable: ResourceList,
    pub available: ResourceList,
    pub pod_total_requests: ResourceList,
    pub pod_total_limits: ResourceList,
    pub daemon_set_requested: ResourceList,
    pub daemon_set_limits: ResourceList,
    pub volume_limits: BTreeMap<String, i32>,
    pub observed_at: DateTime<Utc>,
}

/// Serializable view of a pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSummary {
    pub namespace: String,
    pub name: String,
    pub node: Option<String>,
    pub phase: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub daemon_set: bool,
    pub requests: ResourceList,
    pub limits: ResourceList,
}

impl PodSummary {
    pub fn of(pod: &Pod) -> Self {
        let key = PodKey::from_pod(pod);
        Self {
            namespace: key.namespace,
            name: key.name,
            node: pods::node_name(pod).map(str::to_string),
            phase: pods::phase(pod).map(str::to_string),
            created_at: pods::creation_timestamp(pod).map(|t| t.0),
            daemon_set: pods::is_owned_by_daemon_set(pod),
            requests: pods::requests_for_pod(pod),
            limits: pods::limits_for_pod(pod),
        }
    }
}

/// Cluster-wide totals across every tracked node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub node_count: usize,
    pub ready_node_count: usize,
    pub bound_pod_count: usize,
    pub unbound_pod_count: usize,
    pub allocatable: ResourceList,
    pub pod_total_requests: ResourceList,
    pub daemon_set_requested: ResourceList,
    pub last_node_creation: Option<DateTime<Utc>>,
    pub last_node_deletion: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup: Option<StartupStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::fixtures::node;
    use crate::pods::fixtures::{daemon_set_owned, pod, with_phase, with_resources};
    use k8s_openapi::api::storage::v1::{CSINodeDriver, CSINodeSpec, VolumeNodeResources};

    fn assert_consistent(snapshot: &NodeSnapshot) {
        assert_eq!(
            *snapshot.available(),
            resources::subtract(snapshot.allocatable(), snapshot.pod_total_requests())
        );
        let mut pod_keys: Vec<_> = snapshot.pods.keys().collect();
        let mut usage_keys: Vec<_> = snapshot.usage.keys().collect();
        pod_keys.sort();
        usage_keys.sort();
        assert_eq!(pod_keys, usage_keys);
    }

    #[test]
    fn test_build_sums_assigned_pods_and_skips_terminal() {
        let pods = vec![
            pod("default", "a", Some("n1"), "1"),
            pod("default", "b", Some("n1"), "500m"),
            with_phase(pod("default", "c", Some("n1"), "2"), "Succeeded"),
        ];
        let snapshot = NodeSnapshot::build(node("n1", "u1", 0, "4"), pods, Utc::now());

        assert_eq!(snapshot.pods().len(), 2);
        assert_eq!(snapshot.pod_total_requests().cpu(), 1_500);
        assert_eq!(snapshot.available().cpu(), 2_500);
        assert_eq!(snapshot.capacity().get("pods"), 110_000);
        assert_consistent(&snapshot);
    }

    #[test]
    fn test_add_and_remove_pod_restore_aggregates() {
        let mut snapshot = NodeSnapshot::build(node("n1", "u1", 0, "4"), vec![], Utc::now());
        let p = with_resources(
            pod("default", "a", Some("n1"), "1"),
            &[("cpu", "1")],
            &[("cpu", "2")],
        );
        let key = PodKey::from_pod(&p);

        assert!(snapshot.add_pod(key.clone(), p.clone()));
        assert_eq!(snapshot.available().cpu(), 3_000);
        assert_eq!(snapshot.pod_total_limits().cpu(), 2_000);
        assert_consistent(&snapshot);

        // re-adding refreshes without double counting
        assert!(!snapshot.add_pod(key.clone(), p));
        assert_eq!(snapshot.pod_total_requests().cpu(), 1_000);

        assert!(snapshot.remove_pod(&key).is_some());
        assert_eq!(snapshot.available().cpu(), 4_000);
        assert!(snapshot.pod_total_requests().is_zero());
        assert!(snapshot.pod_total_limits().is_zero());
        assert!(snapshot.remove_pod(&key).is_none());
        assert_consistent(&snapshot);
    }

    #[test]
    fn test_daemon_set_aggregates_reversed_on_removal() {
        let ds = daemon_set_owned(with_resources(
            pod("kube-system", "exporter", Some("n1"), "1"),
            &[("cpu", "200m")],
            &[("cpu", "400m")],
        ));
        let key = PodKey::from_pod(&ds);
        let mut snapshot = NodeSnapshot::build(node("n1", "u1", 0, "4"), vec![ds], Utc::now());
        assert_eq!(snapshot.daemon_set_requested().cpu(), 200);
        assert_eq!(snapshot.daemon_set_limits().cpu(), 400);
        assert_eq!(snapshot.summary().daemon_set_pod_count, 1);

        snapshot.remove_pod(&key);
        assert!(snapshot.daemon_set_requested().is_zero());
        assert!(snapshot.daemon_set_limits().is_zero());
    }

    #[test]
    fn test_volume_limits_from_csi_node() {
        let mut snapshot = NodeSnapshot::build(node("n1", "u1", 0, "4"), vec![], Utc::now());
        let csi = CSINode {
            spec: CSINodeSpec {
                drivers: vec![
                    CSINodeDriver {
                        name: "ebs.csi.aws.com".to_string(),
                        node_id: "i-123".to_string(),
                        allocatable: Some(VolumeNodeResources { count: Some(25) }),
                        ..Default::default()
                    },
                    CSINodeDriver {
                        name: "efs.csi.aws.com".to_string(),
                        node_id: "i-123".to_string(),
                        ..Default::default()
                    },
                ],
            },
            ..Default::default()
        };
        snapshot.set_volume_limits(&csi);
        assert_eq!(snapshot.volume_limits().len(), 1);
        assert_eq!(snapshot.volume_limits()["ebs.csi.aws.com"], 25);
    }

    #[test]
    fn test_utilization() {
        let snapshot = NodeSnapshot::build(
            node("n1", "u1", 0, "4"),
            vec![pod("default", "a", Some("n1"), "1")],
            Utc::now(),
        );
        assert_eq!(snapshot.utilization("cpu"), Some(0.25));
        assert_eq!(snapshot.utilization("nvidia.com/gpu"), None);
    }
}

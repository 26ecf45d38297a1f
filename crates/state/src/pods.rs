//! Pod identity and accounting helpers

use crate::resources::{self, ResourceList};
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};
use std::fmt;

const PHASE_SUCCEEDED: &str = "Succeeded";
const PHASE_FAILED: &str = "Failed";
const DAEMON_SET_KIND: &str = "DaemonSet";

/// Cluster-unique pod identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name: pod.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Node the pod is assigned to, if any
pub fn node_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_deref())
        .filter(|name| !name.is_empty())
}

pub fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

/// Completed or failed pods no longer hold resources on their node
pub fn is_terminal(pod: &Pod) -> bool {
    matches!(phase(pod), Some(PHASE_SUCCEEDED) | Some(PHASE_FAILED))
}

pub fn is_owned_by_daemon_set(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|r| r.kind == DAEMON_SET_KIND))
        .unwrap_or(false)
}

pub fn creation_timestamp(pod: &Pod) -> Option<&Time> {
    pod.metadata.creation_timestamp.as_ref()
}

/// Effective requests: containers summed, raised to any larger init container,
/// plus pod overhead. Restartable (sidecar) init containers keep running next
/// to the app containers, so they add to the sum and to every init container
/// that starts after them. A limit without a request counts as the request.
pub fn requests_for_pod(pod: &Pod) -> ResourceList {
    effective(pod, container_requests)
}

/// Effective limits, aggregated the same way as requests
pub fn limits_for_pod(pod: &Pod) -> ResourceList {
    effective(pod, container_limits)
}

fn effective(pod: &Pod, per_container: fn(&Container) -> ResourceList) -> ResourceList {
    let Some(spec) = pod.spec.as_ref() else {
        return ResourceList::new();
    };

    let containers: Vec<ResourceList> = spec.containers.iter().map(per_container).collect();
    let mut sidecars = ResourceList::new();
    let mut init_peak = ResourceList::new();
    for init in spec.init_containers.iter().flatten() {
        let usage = per_container(init);
        if is_restartable(init) {
            sidecars = resources::merge([&sidecars, &usage]);
            init_peak = resources::max(&init_peak, &sidecars);
        } else {
            init_peak = resources::max(&init_peak, &resources::merge([&sidecars, &usage]));
        }
    }
    let running = resources::merge(containers.iter().chain([&sidecars]));
    let total = resources::max(&running, &init_peak);

    match spec.overhead.as_ref() {
        Some(overhead) => resources::merge([&total, &ResourceList::from_quantities(overhead)]),
        None => total,
    }
}

fn is_restartable(init: &Container) -> bool {
    init.restart_policy.as_deref() == Some("Always")
}

fn container_requests(container: &Container) -> ResourceList {
    let Some(reqs) = container.resources.as_ref() else {
        return ResourceList::new();
    };
    let mut requests = reqs
        .requests
        .as_ref()
        .map(ResourceList::from_quantities)
        .unwrap_or_default();
    if let Some(limits) = reqs.limits.as_ref() {
        for (name, milli) in ResourceList::from_quantities(limits).iter() {
            if !requests.contains(name) {
                requests.set(name, milli);
            }
        }
    }
    requests
}

fn container_limits(container: &Container) -> ResourceList {
    container
        .resources
        .as_ref()
        .and_then(|r| r.limits.as_ref())
        .map(ResourceList::from_quantities)
        .unwrap_or_default()
}

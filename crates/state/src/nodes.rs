//! Node descriptor helpers

use k8s_openapi::api::core::v1::{Node, NodeCondition};
use serde::{Deserialize, Serialize};
use std::fmt;

const NODE_READY: &str = "Ready";
const CONDITION_TRUE: &str = "True";
const CONDITION_FALSE: &str = "False";

pub const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
pub const LEGACY_INSTANCE_TYPE_LABEL: &str = "beta.kubernetes.io/instance-type";
pub const CAPACITY_TYPE_LABEL: &str = "karpenter.sh/capacity-type";

/// Coarse node readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
    Cordoned,
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "Ready"),
            NodeStatus::NotReady => write!(f, "NotReady"),
            NodeStatus::Cordoned => write!(f, "Cordoned"),
            NodeStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

pub fn condition<'a>(node: &'a Node, condition_type: &str) -> Option<&'a NodeCondition> {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == condition_type))
}

/// Cordoning wins over the Ready condition
pub fn ready_status(node: &Node) -> NodeStatus {
    let unschedulable = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    if unschedulable {
        return NodeStatus::Cordoned;
    }
    match condition(node, NODE_READY).map(|c| c.status.as_str()) {
        Some(CONDITION_TRUE) => NodeStatus::Ready,
        Some(CONDITION_FALSE) => NodeStatus::NotReady,
        _ => NodeStatus::Unknown,
    }
}

pub fn label<'a>(node: &'a Node, key: &str) -> Option<&'a str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

pub fn instance_type(node: &Node) -> Option<&str> {
    label(node, INSTANCE_TYPE_LABEL).or_else(|| label(node, LEGACY_INSTANCE_TYPE_LABEL))
}

pub fn capacity_type(node: &Node) -> Option<&str> {
    label(node, CAPACITY_TYPE_LABEL)
}

/// Descriptor carrying only a name, for nodes the data source no longer knows
pub(crate) fn placeholder(name: &str) -> Node {
    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::pods::fixtures::quantities;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeSpec, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    /// A Ready node whose capacity and allocatable CPU are both `cpu`
    pub fn node(name: &str, uid: &str, created_secs: i64, cpu: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: Some(uid.to_string()),
                creation_timestamp: Some(Time(Utc.timestamp_opt(created_secs, 0).unwrap())),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            status: Some(NodeStatus {
                allocatable: Some(quantities(&[("cpu", cpu), ("memory", "8Gi")])),
                capacity: Some(quantities(&[("cpu", cpu), ("memory", "8Gi"), ("pods", "110")])),
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    pub fn with_ready(mut node: Node, status: &str) -> Node {
        if let Some(s) = node.status.as_mut() {
            s.conditions = Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: status.to_string(),
                ..Default::default()
            }]);
        }
        node
    }

    pub fn deleting(mut node: Node, secs: i64) -> Node {
        node.metadata.deletion_timestamp = Some(Time(Utc.timestamp_opt(secs, 0).unwrap()));
        node
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_ready_status() {
        let n = node("n1", "u1", 0, "4");
        assert_eq!(ready_status(&n), NodeStatus::Ready);
        assert_eq!(ready_status(&with_ready(n.clone(), "False")), NodeStatus::NotReady);
        assert_eq!(ready_status(&with_ready(n.clone(), "Unknown")), NodeStatus::Unknown);
        assert_eq!(ready_status(&placeholder("n2")), NodeStatus::Unknown);
    }

    #[test]
    fn test_cordoned_overrides_ready() {
        let mut n = node("n1", "u1", 0, "4");
        n.spec.as_mut().unwrap().unschedulable = Some(true);
        assert_eq!(ready_status(&n), NodeStatus::Cordoned);
    }

    #[test]
    fn test_instance_type_falls_back_to_legacy_label() {
        let mut n = node("n1", "u1", 0, "4");
        assert_eq!(instance_type(&n), None);
        n.metadata.labels = Some(
            [(LEGACY_INSTANCE_TYPE_LABEL.to_string(), "m5.large".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(instance_type(&n), Some("m5.large"));
        assert_eq!(capacity_type(&n), None);
    }
}

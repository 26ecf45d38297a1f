//! Pod to node binding table
//!
//! Tracks which node each bound pod is attributed to, alongside the pods
//! known to have no node assignment. A pod identity is in at most one of
//! the two sets; every method that inserts into one removes from the other.

use crate::pods::PodKey;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: HashMap<PodKey, String>,
    unbound: HashMap<PodKey, Pod>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a pod is bound to a node, leaving the unbound set
    pub fn bind(&mut self, key: PodKey, node_name: impl Into<String>) -> Option<String> {
        self.unbound.remove(&key);
        self.bindings.insert(key, node_name.into())
    }

    /// Record a pod with no node assignment, dropping any binding
    pub fn mark_unbound(&mut self, key: PodKey, pod: Pod) -> Option<String> {
        let previous = self.bindings.remove(&key);
        self.unbound.insert(key, pod);
        previous
    }

    pub fn unbind(&mut self, key: &PodKey) -> Option<String> {
        self.bindings.remove(key)
    }

    pub fn remove_unbound(&mut self, key: &PodKey) -> Option<Pod> {
        self.unbound.remove(key)
    }

    pub fn node_of(&self, key: &PodKey) -> Option<&str> {
        self.bindings.get(key).map(String::as_str)
    }

    pub fn is_unbound(&self, key: &PodKey) -> bool {
        self.unbound.contains_key(key)
    }

    /// Whether the pod is tracked in either set
    pub fn is_known(&self, key: &PodKey) -> bool {
        self.bindings.contains_key(key) || self.unbound.contains_key(key)
    }

    /// Pods bound to the given node
    pub fn pods_on(&self, node_name: &str) -> Vec<PodKey> {
        self.bindings
            .iter()
            .filter(|(_, node)| node.as_str() == node_name)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop every binding to a node, returning the affected pods
    pub fn unbind_node(&mut self, node_name: &str) -> Vec<PodKey> {
        let keys = self.pods_on(node_name);
        for key in &keys {
            self.bindings.remove(key);
        }
        keys
    }

    pub fn unbound_pods(&self) -> impl Iterator<Item = &Pod> {
        self.unbound.values()
    }

    pub fn bound_keys(&self) -> impl Iterator<Item = &PodKey> {
        self.bindings.keys()
    }

    pub fn unbound_keys(&self) -> impl Iterator<Item = &PodKey> {
        self.unbound.keys()
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn unbound_count(&self) -> usize {
        self.unbound.len()
    }
}

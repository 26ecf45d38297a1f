//! Data source boundary
//!
//! The store reads nodes, pod listings and CSINode objects through the
//! `ClusterSource` trait. A lookup that finds nothing returns `Ok(None)`;
//! `Err` is reserved for failed calls.

mod client;
mod memory;

pub use self::client::KubeSource;
pub use self::memory::MemorySource;

use crate::error::SourceError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::storage::v1::CSINode;

#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Pods whose `spec.nodeName` is the given node, in any phase
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, SourceError>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>, SourceError>;

    async fn get_csi_node(&self, name: &str) -> Result<Option<CSINode>, SourceError>;
}

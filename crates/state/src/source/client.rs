use super::ClusterSource;
use crate::error::SourceError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::storage::v1::CSINode;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

const PAGE_SIZE: u32 = 500;

/// Reads cluster objects from the Kubernetes API server
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterSource for KubeSource {
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, SourceError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let selector = format!("spec.nodeName={node_name}");
        let list_err = |e: kube::Error| SourceError::ListPods {
            node: node_name.to_string(),
            message: e.to_string(),
        };

        let mut pods = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut params = ListParams::default().fields(&selector).limit(PAGE_SIZE);
            if let Some(token) = continue_token.as_deref() {
                params = params.continue_token(token);
            }
            let page = api.list(&params).await.map_err(list_err)?;
            pods.extend(page.items);
            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        debug!(node = %node_name, pods = pods.len(), "Listed pods on node");
        Ok(pods)
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, SourceError> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get_opt(name).await.map_err(|e| SourceError::GetNode {
            node: name.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_csi_node(&self, name: &str) -> Result<Option<CSINode>, SourceError> {
        let api: Api<CSINode> = Api::all(self.client.clone());
        api.get_opt(name).await.map_err(|e| SourceError::GetCsiNode {
            node: name.to_string(),
            message: e.to_string(),
        })
    }
}

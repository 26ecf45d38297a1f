//! API client for the cluster state agent

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Resource name to amount in milli-units
pub type ResourceList = BTreeMap<String, i64>;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request, failing on any non-success status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.fetch(path).await?;
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, error_message(&body));
        }
        serde_json::from_str(&body).context("Failed to parse response")
    }

    /// Make a GET request to a health endpoint, which reports failure as 503
    /// with a JSON body
    pub async fn get_status<T: DeserializeOwned>(&self, path: &str) -> Result<(bool, T)> {
        let (status, body) = self.fetch(path).await?;
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            anyhow::bail!("API error ({}): {}", status, error_message(&body));
        }
        let parsed = serde_json::from_str(&body).context("Failed to parse response")?;
        Ok((status.is_success(), parsed))
    }

    async fn fetch(&self, path: &str) -> Result<(StatusCode, String)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        Ok((status, body))
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupStats {
    pub longest_seconds: f64,
    pub shortest_seconds: f64,
    pub average_seconds: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub node_count: usize,
    pub ready_node_count: usize,
    pub bound_pod_count: usize,
    pub unbound_pod_count: usize,
    #[serde(default)]
    pub allocatable: ResourceList,
    #[serde(default)]
    pub pod_total_requests: ResourceList,
    #[serde(default)]
    pub daemon_set_requested: ResourceList,
    pub last_node_creation: Option<DateTime<Utc>>,
    pub last_node_deletion: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<StartupStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    pub uid: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub instance_type: Option<String>,
    pub capacity_type: Option<String>,
    pub pod_count: usize,
    pub daemon_set_pod_count: usize,
    #[serde(default)]
    pub capacity: ResourceList,
    #[serde(default)]
    pub allocatable: ResourceList,
    #[serde(default)]
    pub available: ResourceList,
    #[serde(default)]
    pub pod_total_requests: ResourceList,
    #[serde(default)]
    pub pod_total_limits: ResourceList,
    #[serde(default)]
    pub daemon_set_requested: ResourceList,
    #[serde(default)]
    pub daemon_set_limits: ResourceList,
    #[serde(default)]
    pub volume_limits: BTreeMap<String, i32>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSummary {
    pub namespace: String,
    pub name: String,
    pub node: Option<String>,
    pub phase: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub daemon_set: bool,
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetail {
    #[serde(flatten)]
    pub node: NodeSummary,
    pub pods: Vec<PodSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub synced: bool,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_parses_summary() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/cluster")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"node_count":2,"ready_node_count":1,"bound_pod_count":5,
                    "unbound_pod_count":1,"allocatable":{"cpu":8000},
                    "pod_total_requests":{"cpu":2500},"daemon_set_requested":{},
                    "last_node_creation":null,"last_node_deletion":null,
                    "last_updated":"2024-01-01T00:00:00Z"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let summary: ClusterSummary = client.get("api/v1/cluster").await.unwrap();

        mock.assert_async().await;
        assert_eq!(summary.node_count, 2);
        assert_eq!(summary.allocatable["cpu"], 8000);
        assert!(summary.startup.is_none());
    }

    #[tokio::test]
    async fn test_get_surfaces_api_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/nodes/missing")
            .with_status(404)
            .with_body(r#"{"error":"node missing is not tracked"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<NodeDetail>("api/v1/nodes/missing")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("not tracked"));
    }

    #[tokio::test]
    async fn test_status_accepts_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(r#"{"ready":false,"reason":"Waiting for initial sync: pod_watcher"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (ok, readiness): (bool, ReadinessResponse) = client.get_status("readyz").await.unwrap();
        assert!(!ok);
        assert!(!readiness.ready);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}

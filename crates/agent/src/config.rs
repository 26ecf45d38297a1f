//! Agent configuration

use anyhow::{Context, Result};
use cluster_state::ClusterConfig;
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration, read from `KSTATE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Cluster name attached to structured logs
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// API server port for health, metrics and state views
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Upper bound on each Kubernetes API call made while building snapshots
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// Emit JSON logs instead of plain text
    #[serde(default = "default_log_json")]
    pub log_json: bool,
}

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_source_timeout() -> u64 {
    30
}

fn default_log_json() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            api_port: default_api_port(),
            source_timeout_secs: default_source_timeout(),
            log_json: default_log_json(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("KSTATE"))
            .build()
            .context("Failed to read configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            source_timeout: Duration::from_secs(self.source_timeout_secs),
            cluster_name: self.cluster_name.clone(),
        }
    }
}

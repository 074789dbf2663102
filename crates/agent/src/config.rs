//! Agent configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use telemetry_lib::PassConfig;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Cluster name reported on every entity
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Timeout of each network call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Directory holding the discovery cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Kubelet endpoint, skips kubelet discovery when set
    #[serde(default)]
    pub kubelet_url: Option<String>,

    /// kube-state-metrics endpoint, skips its discovery when set
    #[serde(default)]
    pub ksm_url: Option<String>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/kube-telemetry")
}

fn default_cache_ttl() -> u64 {
    3600
}

impl AgentConfig {
    /// Load configuration from `TELEMETRY_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("TELEMETRY"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
            .context("invalid telemetry configuration")
    }

    pub fn pass_config(&self) -> PassConfig {
        PassConfig {
            node_name: self.node_name.clone(),
            cluster_name: self.cluster_name.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            cache_dir: self.cache_dir.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            kubelet_url: self.kubelet_url.clone().filter(|u| !u.is_empty()),
            ksm_url: self.ksm_url.clone().filter(|u| !u.is_empty()),
        }
    }
}

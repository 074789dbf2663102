//! Metrics source discovery
//!
//! Each source has a [`Discoverer`] that tries an ordered list of strategies
//! and returns the first endpoint found. [`CachedDiscoverer`] puts a
//! disk-backed cache in front of any discoverer, and [`resolve_role`] decides
//! whether this node also collects cluster-wide data.

mod cache;
mod dns;
mod ksm;
mod kubelet;
mod role;


pub use cache::{CacheError, CachedDiscoverer, DiscoveryStore};
pub use dns::{SrvRecord, SrvResolver, SystemResolver};
pub use ksm::{KsmDiscoverer, KsmStrategy};
pub use kubelet::{KubeletDiscoverer, KubeletStrategy};
pub use role::resolve_role;

use crate::client::{ClientError, KubeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// The metrics sources this agent knows how to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Kubelet,
    KubeStateMetrics,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Kubelet => "kubelet",
            Source::KubeStateMetrics => "kube-state-metrics",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How requests to an endpoint authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointAuth {
    #[default]
    None,
    /// Cluster CA and service account bearer token
    ServiceAccount,
}

/// A located metrics source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEndpoint {
    pub url: Url,
    /// IP of the node the source runs on
    pub node_ip: String,
    #[serde(default)]
    pub auth: EndpointAuth,
}

/// Errors locating a source
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("wrong user-provided endpoint {url}: {source}")]
    InvalidOverride {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint {0} cannot be used over plain HTTP")]
    InvalidScheme(String),

    #[error("DNS lookup of {name} failed: {reason}")]
    Dns { name: String, reason: String },

    #[error("can't get DNS port for {0}")]
    NoSrvRecords(String),

    #[error(transparent)]
    Kube(#[from] KubeError),

    #[error("no service found by label {0}")]
    NoService(String),

    #[error("could not guess the host/port of services labelled {0}")]
    NoPort(String),

    #[error("no pod found by label {0}")]
    NoPod(String),

    #[error("no host IP address found for pods labelled {0}")]
    NoHostIp(String),

    #[error("node {0} has no InternalIP address")]
    NoInternalIp(String),

    #[error("node {0} does not report a kubelet port")]
    NoKubeletPort(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("all discovery strategies failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Locates one metrics source
#[async_trait]
pub trait Discoverer: Send + Sync {
    fn source(&self) -> Source;

    /// Whether a user-supplied endpoint replaces discovery
    ///
    /// An overridden discoverer is never served from, or written to, the
    /// discovery cache.
    fn has_override(&self) -> bool {
        false
    }

    /// Find the endpoint; every network call is bounded by `timeout`
    async fn discover(&self, timeout: Duration) -> Result<DiscoveredEndpoint, DiscoveryError>;
}

/// Run `fut`, failing with [`DiscoveryError::Timeout`] once `timeout` elapses
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, DiscoveryError>
where
    F: Future<Output = Result<T, DiscoveryError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DiscoveryError::Timeout { operation, timeout })?
}

/// Parse a user-supplied endpoint, assuming `http://` when no scheme is given
pub(crate) fn parse_override(raw: &str) -> Result<Url, DiscoveryError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    Url::parse(&candidate).map_err(|source| DiscoveryError::InvalidOverride {
        url: raw.to_string(),
        source,
    })
}

use super::{
    parse_override, with_timeout, DiscoveredEndpoint, Discoverer, DiscoveryError, EndpointAuth,
    Source,
};
use crate::client::Kubernetes;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The kubelet port that requires TLS and authentication
pub const SECURE_KUBELET_PORT: i32 = 10250;

/// Ways of locating the local kubelet, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KubeletStrategy {
    Override,
    /// InternalIP and daemon endpoint port of the local node object
    NodeApi,
}

/// Finds the kubelet of the node this agent runs on
pub struct KubeletDiscoverer {
    kube: Arc<dyn Kubernetes>,
    node_name: String,
    override_url: Option<String>,
}

impl KubeletDiscoverer {
    pub fn new(kube: Arc<dyn Kubernetes>, node_name: impl Into<String>) -> Self {
        Self {
            kube,
            node_name: node_name.into(),
            override_url: None,
        }
    }

    /// Use `url` instead of the node's daemon endpoint
    ///
    /// The node object is still read with an override in place: its
    /// InternalIP is the node identity used for leader election, so a
    /// missing node or InternalIP fails discovery either way. An empty
    /// string means no override.
    pub fn with_override(mut self, url: Option<String>) -> Self {
        self.override_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn strategies(&self) -> Vec<KubeletStrategy> {
        if self.override_url.is_some() {
            vec![KubeletStrategy::Override]
        } else {
            vec![KubeletStrategy::NodeApi]
        }
    }

    fn internal_ip(&self, node: &Node) -> Result<String, DiscoveryError> {
        node.status
            .as_ref()
            .and_then(|s| s.addresses.as_ref())
            .and_then(|addresses| {
                addresses
                    .iter()
                    .find(|a| a.type_ == "InternalIP" && !a.address.is_empty())
            })
            .map(|a| a.address.clone())
            .ok_or_else(|| DiscoveryError::NoInternalIp(self.node_name.clone()))
    }

    fn node_api_endpoint(&self, node: &Node, ip: &str) -> Result<(Url, EndpointAuth), DiscoveryError> {
        let port = node
            .status
            .as_ref()
            .and_then(|s| s.daemon_endpoints.as_ref())
            .and_then(|d| d.kubelet_endpoint.as_ref())
            .map(|e| e.port)
            .filter(|p| *p > 0)
            .ok_or_else(|| DiscoveryError::NoKubeletPort(self.node_name.clone()))?;

        let (scheme, auth) = if port == SECURE_KUBELET_PORT {
            ("https", EndpointAuth::ServiceAccount)
        } else {
            ("http", EndpointAuth::None)
        };

        let raw = format!("{}://{}:{}/", scheme, ip, port);
        let url = Url::parse(&raw)
            .map_err(|source| DiscoveryError::InvalidOverride { url: raw, source })?;
        Ok((url, auth))
    }
}

#[async_trait]
impl Discoverer for KubeletDiscoverer {
    fn source(&self) -> Source {
        Source::Kubelet
    }

    fn has_override(&self) -> bool {
        self.override_url.is_some()
    }

    async fn discover(&self, timeout: Duration) -> Result<DiscoveredEndpoint, DiscoveryError> {
        let node = with_timeout("node lookup", timeout, async {
            self.kube
                .find_node(&self.node_name)
                .await
                .map_err(DiscoveryError::from)
        })
        .await?;
        let node_ip = self.internal_ip(&node)?;

        let mut failures = Vec::new();
        for strategy in self.strategies() {
            let located = match strategy {
                KubeletStrategy::Override => {
                    let url = parse_override(self.override_url.as_deref().unwrap_or_default())?;
                    let auth = if url.scheme() == "https" {
                        EndpointAuth::ServiceAccount
                    } else {
                        EndpointAuth::None
                    };
                    Ok((url, auth))
                }
                KubeletStrategy::NodeApi => self.node_api_endpoint(&node, &node_ip),
            };

            match located {
                Ok((url, auth)) => {
                    debug!(strategy = ?strategy, url = %url, node_ip = %node_ip, "Located kubelet");
                    return Ok(DiscoveredEndpoint { url, node_ip, auth });
                }
                Err(e) => failures.push(format!("{:?}: {}", strategy, e)),
            }
        }

        Err(DiscoveryError::Exhausted(failures))
    }
}

use super::{
    parse_override, with_timeout, DiscoveredEndpoint, Discoverer, DiscoveryError, EndpointAuth,
    Source, SrvResolver,
};
use crate::client::Kubernetes;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const APP_LABEL_NAME: &str = "k8s-app";
const APP_LABEL_VALUE: &str = "kube-state-metrics";
const PORT_NAME: &str = "http-metrics";
const TCP: &str = "TCP";
const QUALIFIED_NAME: &str = "kube-state-metrics.kube-system.svc.cluster.local";
const SRV_NAME: &str = "_http-metrics._tcp.kube-state-metrics.kube-system.svc.cluster.local";

/// Ways of locating kube-state-metrics, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KsmStrategy {
    /// User-supplied endpoint
    Override,
    /// SRV record of the service
    Dns,
    /// Services labelled `k8s-app=kube-state-metrics`
    Api,
}

impl KsmStrategy {
    fn name(&self) -> &'static str {
        match self {
            KsmStrategy::Override => "override",
            KsmStrategy::Dns => "dns",
            KsmStrategy::Api => "api",
        }
    }
}

/// Finds the kube-state-metrics endpoint and the node it runs on
pub struct KsmDiscoverer {
    kube: Arc<dyn Kubernetes>,
    resolver: Arc<dyn SrvResolver>,
    override_url: Option<String>,
}

impl KsmDiscoverer {
    pub fn new(kube: Arc<dyn Kubernetes>, resolver: Arc<dyn SrvResolver>) -> Self {
        Self {
            kube,
            resolver,
            override_url: None,
        }
    }

    /// Use this endpoint instead of DNS and API lookups
    pub fn with_override(mut self, url: Option<String>) -> Self {
        self.override_url = url.filter(|u| !u.is_empty());
        self
    }

    /// The strategies this discoverer will try, in order
    pub fn strategies(&self) -> Vec<KsmStrategy> {
        if self.override_url.is_some() {
            vec![KsmStrategy::Override]
        } else {
            vec![KsmStrategy::Dns, KsmStrategy::Api]
        }
    }

    async fn locate(&self, strategy: KsmStrategy, timeout: Duration) -> Result<Url, DiscoveryError> {
        match strategy {
            KsmStrategy::Override => parse_override(self.override_url.as_deref().unwrap_or_default()),
            KsmStrategy::Dns => with_timeout("SRV lookup", timeout, self.dns_discover()).await,
            KsmStrategy::Api => with_timeout("service lookup", timeout, self.api_discover()).await,
        }
    }

    async fn dns_discover(&self) -> Result<Url, DiscoveryError> {
        let records = self.resolver.lookup_srv(SRV_NAME).await?;
        let record = records
            .first()
            .ok_or_else(|| DiscoveryError::NoSrvRecords(QUALIFIED_NAME.to_string()))?;

        http_url(QUALIFIED_NAME, record.port)
    }

    async fn api_discover(&self) -> Result<Url, DiscoveryError> {
        let selector = format!("{}={}", APP_LABEL_NAME, APP_LABEL_VALUE);
        let services = self
            .kube
            .find_services_by_label(APP_LABEL_NAME, APP_LABEL_VALUE)
            .await?;

        if services.is_empty() {
            return Err(DiscoveryError::NoService(selector));
        }

        for service in &services {
            let Some(spec) = &service.spec else { continue };
            let cluster_ip = spec.cluster_ip.as_deref().unwrap_or_default();
            let ports = spec.ports.as_deref().unwrap_or_default();
            if cluster_ip.is_empty() || ports.is_empty() {
                continue;
            }

            let named = ports
                .iter()
                .find(|p| p.name.as_deref() == Some(PORT_NAME));
            let tcp = || ports.iter().find(|p| p.protocol.as_deref() == Some(TCP));

            if let Some(port) = named.or_else(tcp) {
                let port = u16::try_from(port.port)
                    .map_err(|_| DiscoveryError::NoPort(selector.clone()))?;
                return http_url(cluster_ip, port);
            }
        }

        Err(DiscoveryError::NoPort(selector))
    }

    /// IP of the node running kube-state-metrics
    ///
    /// With several replicas the lexicographically smallest host IP wins so
    /// every node agrees on the same one.
    async fn node_ip(&self) -> Result<String, DiscoveryError> {
        let selector = format!("{}={}", APP_LABEL_NAME, APP_LABEL_VALUE);
        let pods = self
            .kube
            .find_pods_by_label(APP_LABEL_NAME, APP_LABEL_VALUE)
            .await?;

        if pods.is_empty() {
            return Err(DiscoveryError::NoPod(selector));
        }

        pods.iter()
            .filter_map(|pod| pod.status.as_ref()?.host_ip.as_deref())
            .filter(|ip| !ip.is_empty())
            .min()
            .map(str::to_string)
            .ok_or(DiscoveryError::NoHostIp(selector))
    }
}

fn http_url(host: &str, port: u16) -> Result<Url, DiscoveryError> {
    let raw = format!("http://{}:{}/", host, port);
    Url::parse(&raw).map_err(|source| DiscoveryError::InvalidOverride { url: raw, source })
}

#[async_trait]
impl Discoverer for KsmDiscoverer {
    fn source(&self) -> Source {
        Source::KubeStateMetrics
    }

    fn has_override(&self) -> bool {
        self.override_url.is_some()
    }

    async fn discover(&self, timeout: Duration) -> Result<DiscoveredEndpoint, DiscoveryError> {
        let mut failures = Vec::new();
        let mut found = None;

        for strategy in self.strategies() {
            match self.locate(strategy, timeout).await {
                Ok(url) => {
                    debug!(strategy = strategy.name(), url = %url, "Located kube-state-metrics");
                    found = Some(url);
                    break;
                }
                Err(e) if strategy == KsmStrategy::Override => return Err(e),
                Err(e) => {
                    debug!(strategy = strategy.name(), error = %e, "Discovery strategy failed");
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        let mut url = found.ok_or(DiscoveryError::Exhausted(failures))?;

        // kube-state-metrics only serves plain HTTP
        if url.scheme() != "http" && url.set_scheme("http").is_err() {
            return Err(DiscoveryError::InvalidScheme(url.to_string()));
        }

        let node_ip = with_timeout("pod lookup", timeout, self.node_ip()).await?;

        Ok(DiscoveredEndpoint {
            url,
            node_ip,
            auth: EndpointAuth::None,
        })
    }
}

//! One collection pass: discover, group, populate
//!
//! Both sources are located concurrently through the disk cache. The kubelet
//! is collected on every node; kube-state-metrics only on the node it runs on.

use crate::client::Kubernetes;
use crate::definition::{EntityStore, Populator, SpecGroups};
use crate::discovery::{
    resolve_role, CachedDiscoverer, DiscoveryError, DiscoveryStore, KsmDiscoverer,
    KubeletDiscoverer, Source, SrvResolver, SystemResolver,
};
use crate::grouper::{GroupError, GroupOutcome, Grouper, KsmGrouper, KubeletGrouper};
use crate::metric::Catalog;
use crate::models::Role;
use crate::observability::StructuredLogger;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for a collection pass
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Name of the node this agent runs on
    pub node_name: String,
    pub cluster_name: String,
    /// Bound for every network call
    pub timeout: Duration,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    /// Kubelet endpoint override, skips discovery
    pub kubelet_url: Option<String>,
    /// kube-state-metrics endpoint override, skips discovery
    pub ksm_url: Option<String>,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            node_name: "unknown".to_string(),
            cluster_name: "default".to_string(),
            timeout: Duration::from_millis(5000),
            cache_dir: PathBuf::from("/var/cache/kube-telemetry"),
            cache_ttl: Duration::from_secs(3600),
            kubelet_url: None,
            ksm_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PassError {
    #[error("failed to locate the kubelet: {0}")]
    KubeletDiscovery(#[source] DiscoveryError),

    #[error("no data was populated from any source")]
    NothingPopulated,
}

/// What happened to one source during the pass
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: Source,
    pub populated: bool,
    /// Recoverable grouping and population errors
    pub errors: usize,
    /// Why the source produced nothing, when it failed outright
    pub failure: Option<String>,
}

/// Result of a successful pass
#[derive(Debug)]
pub struct PassReport {
    pub role: Role,
    pub store: EntityStore,
    pub sources: Vec<SourceReport>,
}

pub struct CollectionPass {
    kube: Arc<dyn Kubernetes>,
    resolver: Arc<dyn SrvResolver>,
    catalog: Arc<Catalog>,
    config: PassConfig,
    logger: StructuredLogger,
}

impl CollectionPass {
    pub fn new(
        kube: Arc<dyn Kubernetes>,
        resolver: Arc<dyn SrvResolver>,
        catalog: Arc<Catalog>,
        config: PassConfig,
    ) -> Self {
        let logger = StructuredLogger::new(config.node_name.clone());
        Self {
            kube,
            resolver,
            catalog,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Run the pass once
    pub async fn run(&self) -> Result<PassReport, PassError> {
        let started = Instant::now();
        let timeout = self.config.timeout;
        let store = DiscoveryStore::new(&self.config.cache_dir, self.config.cache_ttl);

        let kubelet = CachedDiscoverer::new(
            KubeletDiscoverer::new(self.kube.clone(), self.config.node_name.clone())
                .with_override(self.config.kubelet_url.clone()),
            store.clone(),
            self.kube.clone(),
        );
        let ksm = CachedDiscoverer::new(
            KsmDiscoverer::new(self.kube.clone(), self.resolver.clone())
                .with_override(self.config.ksm_url.clone()),
            store,
            self.kube.clone(),
        );

        let (kubelet_client, ksm_client) =
            tokio::join!(kubelet.discover(timeout), ksm.discover(timeout));

        let kubelet_client = kubelet_client.map_err(|e| {
            self.logger
                .log_discovery_failed(Source::Kubelet, &e.to_string());
            PassError::KubeletDiscovery(e)
        })?;
        self.logger.log_discovery(
            Source::Kubelet,
            kubelet_client.url().as_str(),
            kubelet_client.node_ip(),
        );

        let mut sources = Vec::new();
        let ksm_client = match ksm_client {
            Ok(client) => {
                self.logger.log_discovery(
                    Source::KubeStateMetrics,
                    client.url().as_str(),
                    client.node_ip(),
                );
                Some(client)
            }
            Err(e) => {
                let error = e.to_string();
                self.logger
                    .log_discovery_failed(Source::KubeStateMetrics, &error);
                sources.push(SourceReport {
                    source: Source::KubeStateMetrics,
                    populated: false,
                    errors: 0,
                    failure: Some(error),
                });
                None
            }
        };

        let role = match &ksm_client {
            Some(ksm) => resolve_role(kubelet_client.node_ip(), ksm.node_ip()),
            None => Role::Follower,
        };
        self.logger.log_role(
            role,
            kubelet_client.node_ip(),
            ksm_client.as_ref().map(|c| c.node_ip()),
        );

        let kubelet_grouper = KubeletGrouper::new(
            kubelet_client,
            self.kube.clone(),
            self.catalog.cadvisor_queries.clone(),
        )
        .with_timeout(timeout);
        let ksm_grouper = ksm_client
            .filter(|_| role.is_leader())
            .map(|client| KsmGrouper::new(client, self.catalog.ksm_queries.clone()));

        let (ksm_result, kubelet_result) = tokio::join!(
            async {
                match &ksm_grouper {
                    Some(grouper) => Some(grouper.group(&self.catalog.ksm_specs).await),
                    None => None,
                }
            },
            kubelet_grouper.group(&self.catalog.kubelet_specs),
        );

        let populator = self.catalog.populator(self.config.cluster_name.clone());
        let mut entities = EntityStore::new();

        if let Some(result) = ksm_result {
            sources.push(self.populate_source(
                Source::KubeStateMetrics,
                result,
                &populator,
                &self.catalog.ksm_specs,
                &mut entities,
            ));
        }
        sources.push(self.populate_source(
            Source::Kubelet,
            kubelet_result,
            &populator,
            &self.catalog.kubelet_specs,
            &mut entities,
        ));

        if !sources.iter().any(|s| s.populated) {
            return Err(PassError::NothingPopulated);
        }

        self.logger
            .log_pass_complete(role, entities.len(), started.elapsed());

        Ok(PassReport {
            role,
            store: entities,
            sources,
        })
    }

    fn populate_source(
        &self,
        source: Source,
        result: Result<GroupOutcome, GroupError>,
        populator: &Populator,
        specs: &SpecGroups,
        entities: &mut EntityStore,
    ) -> SourceReport {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = e.to_string();
                self.logger.log_source_failed(source, &error);
                return SourceReport {
                    source,
                    populated: false,
                    errors: 0,
                    failure: Some(error),
                };
            }
        };

        for error in &outcome.errors {
            debug!(source = %source, error = %error, "Recoverable grouping error");
        }

        let populated = populator.populate(&outcome.groups, specs, entities);
        for error in &populated.errors {
            debug!(
                source = %source,
                group = %error.group(),
                entity_id = %error.entity_id(),
                error = %error,
                "Population error"
            );
        }

        let errors = outcome.errors.len() + populated.errors.len();
        self.logger
            .log_source_populated(source, populated.populated, errors);

        SourceReport {
            source,
            populated: populated.populated,
            errors,
            failure: None,
        }
    }
}

/// Builder for a collection pass
pub struct CollectionPassBuilder {
    kube: Option<Arc<dyn Kubernetes>>,
    resolver: Arc<dyn SrvResolver>,
    catalog: Option<Arc<Catalog>>,
    config: PassConfig,
}

impl CollectionPassBuilder {
    /// Create a new builder with default configuration and the system resolver
    pub fn new() -> Self {
        Self {
            kube: None,
            resolver: Arc::new(SystemResolver),
            catalog: None,
            config: PassConfig::default(),
        }
    }

    /// Set the capability client
    pub fn kube(mut self, kube: Arc<dyn Kubernetes>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Replace the SRV resolver
    pub fn resolver(mut self, resolver: Arc<dyn SrvResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a custom catalog instead of the standard one
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(mut self, config: PassConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.config.node_name = node_name.into();
        self
    }

    pub fn cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.config.cluster_name = cluster_name.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn cache(mut self, dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        self.config.cache_dir = dir.into();
        self.config.cache_ttl = ttl;
        self
    }

    pub fn kubelet_url(mut self, url: Option<String>) -> Self {
        self.config.kubelet_url = url;
        self
    }

    pub fn ksm_url(mut self, url: Option<String>) -> Self {
        self.config.ksm_url = url;
        self
    }

    /// Build the pass
    pub fn build(self) -> Result<CollectionPass> {
        let kube = self
            .kube
            .ok_or_else(|| anyhow::anyhow!("Kubernetes client is required"))?;
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(Catalog::standard()));

        Ok(CollectionPass::new(kube, self.resolver, catalog, self.config))
    }
}

impl Default for CollectionPassBuilder {
    fn default() -> Self {
        Self::new()
    }
}

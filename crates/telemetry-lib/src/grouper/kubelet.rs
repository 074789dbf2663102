use super::quantity::{bytes, millicores};
use super::summary::{FsStats, NetworkStats, Summary};
use super::{GroupError, GroupOutcome, Grouper};
use crate::client::{KubeError, Kubernetes, SourceClient};
use crate::definition::SpecGroups;
use crate::discovery::Source;
use crate::models::{RawGroups, RawMetrics, RawValue};
use crate::prometheus::{self, deployment_name_from_creator, PrometheusError, Query};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PODS_PATH: &str = "/pods";
pub const SUMMARY_PATH: &str = "/stats/summary";
pub const CADVISOR_PATH: &str = "/metrics/cadvisor";

/// Bound on the node label lookup unless set with [`KubeletGrouper::with_timeout`]
pub const DEFAULT_NODE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

/// Groups kubelet pod, container, node and volume data
pub struct KubeletGrouper {
    client: SourceClient,
    kube: Arc<dyn Kubernetes>,
    cadvisor_queries: Vec<Query>,
    timeout: Duration,
}

impl KubeletGrouper {
    pub fn new(client: SourceClient, kube: Arc<dyn Kubernetes>, cadvisor_queries: Vec<Query>) -> Self {
        Self {
            client,
            kube,
            cadvisor_queries,
            timeout: DEFAULT_NODE_LOOKUP_TIMEOUT,
        }
    }

    /// Bound the node label lookup
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn node_labels(&self, node_name: &str) -> Result<BTreeMap<String, String>, KubeError> {
        let node = tokio::time::timeout(self.timeout, self.kube.find_node(node_name))
            .await
            .map_err(|_| KubeError::Timeout(self.timeout))??;
        Ok(node.metadata.labels.unwrap_or_default())
    }

    async fn fetch_pods(&self) -> Result<PodList, GroupError> {
        self.client
            .get_json(PODS_PATH)
            .await
            .map_err(|source| GroupError::Fetch {
                path: PODS_PATH.to_string(),
                source,
            })
    }

    async fn fetch_summary(&self) -> Result<Summary, GroupError> {
        self.client
            .get_json(SUMMARY_PATH)
            .await
            .map_err(|source| GroupError::Fetch {
                path: SUMMARY_PATH.to_string(),
                source,
            })
    }

    async fn fetch_cadvisor(&self) -> Result<Vec<prometheus::MetricFamily>, PrometheusError> {
        prometheus::fetch_families(&self.client, CADVISOR_PATH, &self.cadvisor_queries).await
    }
}

#[async_trait]
impl Grouper for KubeletGrouper {
    fn source(&self) -> Source {
        Source::Kubelet
    }

    async fn group(&self, _specs: &SpecGroups) -> Result<GroupOutcome, GroupError> {
        let (pods, summary, cadvisor) =
            tokio::join!(self.fetch_pods(), self.fetch_summary(), self.fetch_cadvisor());

        let pods = pods?;
        let summary = summary?;

        let mut outcome = GroupOutcome::default();
        let groups = &mut outcome.groups;

        for pod in &pods.items {
            group_pod(groups, pod);
        }
        merge_summary(groups, &summary);

        match cadvisor {
            Ok(families) => merge_cadvisor(groups, &families),
            Err(e) => outcome.errors.push(e.into()),
        }

        let node_name = summary.node.node_name.clone();
        if !node_name.is_empty() {
            match self.node_labels(&node_name).await {
                Ok(labels) => {
                    if let Some(entry) = outcome
                        .groups
                        .get_mut("node")
                        .and_then(|nodes| nodes.get_mut(&node_name))
                    {
                        entry.insert("labels".into(), RawValue::Labels(labels));
                    }
                }
                Err(source) => outcome.errors.push(GroupError::NodeLabels {
                    node: node_name,
                    source,
                }),
            }
        }

        debug!(
            pods = outcome.groups.get("pod").map_or(0, |g| g.len()),
            containers = outcome.groups.get("container").map_or(0, |g| g.len()),
            volumes = outcome.groups.get("volume").map_or(0, |g| g.len()),
            errors = outcome.errors.len(),
            "Grouped kubelet data"
        );

        Ok(outcome)
    }
}

fn entity<'a>(groups: &'a mut RawGroups, group: &str, id: String) -> &'a mut RawMetrics {
    groups
        .entry(group.to_string())
        .or_default()
        .entry(id)
        .or_default()
}

fn existing<'a>(groups: &'a mut RawGroups, group: &str, id: &str) -> Option<&'a mut RawMetrics> {
    groups.get_mut(group)?.get_mut(id)
}

fn put(metrics: &mut RawMetrics, key: &str, value: Option<impl Into<RawValue>>) {
    if let Some(value) = value {
        metrics.insert(key.to_string(), value.into());
    }
}

fn put_str(metrics: &mut RawMetrics, key: &str, value: Option<&String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        metrics.insert(key.to_string(), RawValue::Str(value.clone()));
    }
}

/// Container runtime IDs come as `<runtime>://<id>`
fn strip_runtime_prefix(id: &str) -> &str {
    id.split_once("://").map_or(id, |(_, rest)| rest)
}

/// Pod metadata shared by the pod entity and its containers
struct PodIdentity {
    namespace: String,
    name: String,
    node_name: Option<String>,
    node_ip: Option<String>,
    deployment: String,
    labels: BTreeMap<String, String>,
}

impl PodIdentity {
    fn from_pod(pod: &Pod) -> Option<Self> {
        let namespace = pod.metadata.namespace.clone()?;
        let name = pod.metadata.name.clone()?;
        let owner = pod
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.first());

        Some(Self {
            namespace,
            name,
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            node_ip: pod.status.as_ref().and_then(|s| s.host_ip.clone()),
            deployment: owner
                .map(|o| deployment_name_from_creator(&o.kind, &o.name))
                .unwrap_or_default(),
            labels: pod.metadata.labels.clone().unwrap_or_default(),
        })
    }

    fn write(&self, metrics: &mut RawMetrics) {
        metrics.insert("namespace".into(), self.namespace.as_str().into());
        metrics.insert("podName".into(), self.name.as_str().into());
        put_str(metrics, "nodeName", self.node_name.as_ref());
        put_str(metrics, "nodeIP", self.node_ip.as_ref());
        if !self.deployment.is_empty() {
            metrics.insert("deploymentName".into(), self.deployment.as_str().into());
        }
        if !self.labels.is_empty() {
            metrics.insert("labels".into(), RawValue::Labels(self.labels.clone()));
        }
    }
}

fn group_pod(groups: &mut RawGroups, pod: &Pod) {
    let Some(identity) = PodIdentity::from_pod(pod) else {
        return;
    };

    let pod_id = format!("{}_{}", identity.namespace, identity.name);
    let metrics = entity(groups, "pod", pod_id);
    identity.write(metrics);

    if let Some(owner) = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.first())
    {
        metrics.insert("createdKind".into(), owner.kind.as_str().into());
        metrics.insert("createdBy".into(), owner.name.as_str().into());
    }
    put(
        metrics,
        "createdAt",
        pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
    );

    if let Some(status) = &pod.status {
        put(metrics, "startTime", status.start_time.as_ref().map(|t| t.0));
        put_str(metrics, "status", status.phase.as_ref());
        put_str(metrics, "reason", status.reason.as_ref());
        put_str(metrics, "message", status.message.as_ref());

        for condition in status.conditions.iter().flatten() {
            match condition.type_.as_str() {
                "Ready" => put_str(metrics, "isReady", Some(&condition.status)),
                "PodScheduled" => put_str(metrics, "isScheduled", Some(&condition.status)),
                _ => {}
            }
        }
    }

    let statuses: &[ContainerStatus] = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    for container in pod.spec.iter().flat_map(|s| s.containers.iter()) {
        let status = statuses.iter().find(|s| s.name == container.name);
        group_container(groups, &identity, container, status);
    }
}

fn group_container(
    groups: &mut RawGroups,
    identity: &PodIdentity,
    container: &Container,
    status: Option<&ContainerStatus>,
) {
    let id = format!("{}_{}_{}", identity.namespace, identity.name, container.name);
    let metrics = entity(groups, "container", id);
    identity.write(metrics);

    metrics.insert("containerName".into(), container.name.as_str().into());
    put_str(metrics, "containerImage", container.image.as_ref());

    if let Some(resources) = &container.resources {
        let requests = resources.requests.as_ref();
        let limits = resources.limits.as_ref();
        put(
            metrics,
            "cpuRequestedCores",
            requests.and_then(|r| r.get("cpu")).and_then(|q| millicores(&q.0)),
        );
        put(
            metrics,
            "cpuLimitCores",
            limits.and_then(|r| r.get("cpu")).and_then(|q| millicores(&q.0)),
        );
        put(
            metrics,
            "memoryRequestedBytes",
            requests.and_then(|r| r.get("memory")).and_then(|q| bytes(&q.0)),
        );
        put(
            metrics,
            "memoryLimitBytes",
            limits.and_then(|r| r.get("memory")).and_then(|q| bytes(&q.0)),
        );
    }

    let Some(status) = status else {
        return;
    };

    if let Some(id) = status.container_id.as_deref() {
        metrics.insert("containerID".into(), strip_runtime_prefix(id).into());
    }
    if !status.image_id.is_empty() {
        metrics.insert(
            "containerImageID".into(),
            strip_runtime_prefix(&status.image_id).into(),
        );
    }
    metrics.insert("restartCount".into(), RawValue::Int(i64::from(status.restart_count)));
    metrics.insert("isReady".into(), RawValue::Bool(status.ready));

    if let Some(state) = &status.state {
        if let Some(running) = &state.running {
            metrics.insert("status".into(), "Running".into());
            put(metrics, "startedAt", running.started_at.as_ref().map(|t| t.0));
        } else if let Some(waiting) = &state.waiting {
            metrics.insert("status".into(), "Waiting".into());
            put_str(metrics, "reason", waiting.reason.as_ref());
        } else if let Some(terminated) = &state.terminated {
            metrics.insert("status".into(), "Terminated".into());
            put_str(metrics, "reason", terminated.reason.as_ref());
        }
    }
}

fn put_fs(metrics: &mut RawMetrics, prefix: &str, fs: &FsStats) {
    put(metrics, &format!("{}AvailableBytes", prefix), fs.available_bytes);
    put(metrics, &format!("{}CapacityBytes", prefix), fs.capacity_bytes);
    put(metrics, &format!("{}UsedBytes", prefix), fs.used_bytes);
    put(metrics, &format!("{}InodesFree", prefix), fs.inodes_free);
    put(metrics, &format!("{}Inodes", prefix), fs.inodes);
    put(metrics, &format!("{}InodesUsed", prefix), fs.inodes_used);
}

fn put_network(metrics: &mut RawMetrics, network: &NetworkStats) {
    put(metrics, "rxBytes", network.rx_bytes);
    put(metrics, "txBytes", network.tx_bytes);
    put(metrics, "errors", network.errors());
}

/// Merge usage from `/stats/summary`
///
/// Pod and container usage only lands on entities already known from
/// `/pods`; node and volume entities are created here.
fn merge_summary(groups: &mut RawGroups, summary: &Summary) {
    let node = &summary.node;
    if !node.node_name.is_empty() {
        let metrics = entity(groups, "node", node.node_name.clone());
        metrics.insert("nodeName".into(), node.node_name.as_str().into());

        if let Some(cpu) = &node.cpu {
            put(metrics, "usageNanoCores", cpu.usage_nano_cores);
            put(metrics, "usageCoreNanoSeconds", cpu.usage_core_nano_seconds);
        }
        if let Some(memory) = &node.memory {
            put(metrics, "memoryAvailableBytes", memory.available_bytes);
            put(metrics, "memoryUsageBytes", memory.usage_bytes);
            put(metrics, "memoryWorkingSetBytes", memory.working_set_bytes);
            put(metrics, "memoryRssBytes", memory.rss_bytes);
            put(metrics, "memoryPageFaults", memory.page_faults);
            put(metrics, "memoryMajorPageFaults", memory.major_page_faults);
        }
        if let Some(network) = &node.network {
            put_network(metrics, network);
        }
        if let Some(fs) = &node.fs {
            put_fs(metrics, "fs", fs);
        }
        if let Some(image_fs) = node.runtime.as_ref().and_then(|r| r.image_fs.as_ref()) {
            put_fs(metrics, "runtime", image_fs);
        }
    }

    for pod in &summary.pods {
        let namespace = &pod.pod_ref.namespace;
        let name = &pod.pod_ref.name;

        if let Some(metrics) = existing(groups, "pod", &format!("{}_{}", namespace, name)) {
            if let Some(network) = &pod.network {
                put_network(metrics, network);
            }
        }

        for container in &pod.containers {
            let id = format!("{}_{}_{}", namespace, name, container.name);
            let Some(metrics) = existing(groups, "container", &id) else {
                continue;
            };
            if let Some(memory) = &container.memory {
                put(metrics, "usageBytes", memory.usage_bytes);
                put(metrics, "workingSetBytes", memory.working_set_bytes);
            }
            if let Some(cpu) = &container.cpu {
                put(metrics, "usageNanoCores", cpu.usage_nano_cores);
            }
            if let Some(rootfs) = &container.rootfs {
                put_fs(metrics, "fs", rootfs);
            }
        }

        for volume in &pod.volumes {
            let id = format!("{}_{}_{}", namespace, name, volume.name);
            let metrics = entity(groups, "volume", id);
            metrics.insert("volumeName".into(), volume.name.as_str().into());
            metrics.insert("namespace".into(), namespace.as_str().into());
            metrics.insert("podName".into(), name.as_str().into());
            put_fs(metrics, "fs", &volume.fs);
            if let Some(pvc) = &volume.pvc_ref {
                metrics.insert("pvcName".into(), pvc.name.as_str().into());
                metrics.insert("pvcNamespace".into(), pvc.namespace.as_str().into());
            }
        }
    }
}

/// Fill container IDs from cAdvisor series, never overwriting `/pods` data
fn merge_cadvisor(groups: &mut RawGroups, families: &[prometheus::MetricFamily]) {
    for family in families {
        for sample in &family.samples {
            let namespace = sample.label("namespace");
            let pod = first_label(sample, &["pod", "pod_name"]);
            let container = first_label(sample, &["container", "container_name"]);
            if namespace.is_empty() || pod.is_empty() || container.is_empty() {
                continue;
            }

            let id = format!("{}_{}_{}", namespace, pod, container);
            let Some(metrics) = existing(groups, "container", &id) else {
                continue;
            };

            let container_id = sample.label("id").rsplit('/').next().unwrap_or_default();
            if !container_id.is_empty() && !metrics.contains_key("containerID") {
                metrics.insert("containerID".into(), container_id.into());
            }

            let image = sample.label("image");
            if !image.is_empty() && !metrics.contains_key("containerImageID") {
                metrics.insert("containerImageID".into(), image.into());
            }
        }
    }
}

fn first_label<'a>(sample: &'a prometheus::Sample, names: &[&str]) -> &'a str {
    names
        .iter()
        .map(|name| sample.label(name))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

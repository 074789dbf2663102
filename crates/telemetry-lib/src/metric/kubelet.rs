use super::transforms::{
    from_nano, from_nano_to_milli, is_persistent_volume, one_metric_per_label, to_complement_percentage,
    to_cores, to_numeric_boolean, to_timestamp,
};
use crate::definition::{from_raw, raw_string, transform, FetchError, Spec, SpecGroup, SpecGroups};
use crate::models::MetricType::{Attribute, Gauge, Rate};
use crate::models::{MetricType, RawGroups};
use crate::prometheus::{LabelOperator, Query};

/// Entity ID of a pod: its raw ID without the `<namespace>_` prefix
pub fn pod_entity_id(group: &str, entity_id: &str, groups: &RawGroups) -> Result<String, FetchError> {
    let namespace = raw_string(groups, group, entity_id, "namespace")?;
    entity_id
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(str::to_string)
        .ok_or_else(|| {
            FetchError::Transform(format!(
                "entity {} does not belong to namespace {}",
                entity_id, namespace
            ))
        })
}

/// Entity ID of a container: the container name
pub fn container_entity_id(
    group: &str,
    entity_id: &str,
    groups: &RawGroups,
) -> Result<String, FetchError> {
    raw_string(groups, group, entity_id, "containerName").map(str::to_string)
}

/// Entity type of kubelet entities, scoped by whatever owns them
pub fn entity_type(
    group: &str,
    entity_id: &str,
    groups: &RawGroups,
    cluster: &str,
) -> Result<String, FetchError> {
    match group {
        "node" => Ok(format!("k8s:{}:{}", cluster, group)),
        "container" | "volume" => {
            let namespace = raw_string(groups, group, entity_id, "namespace")?;
            let pod = raw_string(groups, group, entity_id, "podName")?;
            Ok(format!("k8s:{}:{}:{}:{}", cluster, namespace, pod, group))
        }
        _ => {
            let namespace = raw_string(groups, group, entity_id, "namespace")?;
            Ok(format!("k8s:{}:{}:{}", cluster, namespace, group))
        }
    }
}

fn raw(name: &str, key: &str, metric_type: MetricType) -> Spec {
    Spec::new(name, from_raw(key), metric_type)
}

fn fs_specs(prefix: &str) -> Vec<Spec> {
    ["AvailableBytes", "CapacityBytes", "UsedBytes", "InodesFree", "Inodes", "InodesUsed"]
        .into_iter()
        .map(|suffix| {
            let key = format!("{}{}", prefix, suffix);
            raw(&key, &key, Gauge)
        })
        .collect()
}

fn network_specs() -> Vec<Spec> {
    vec![
        raw("net.rxBytesPerSecond", "rxBytes", Rate),
        raw("net.txBytesPerSecond", "txBytes", Rate),
        raw("net.errorsPerSecond", "errors", Rate),
    ]
}

fn labels_spec() -> Spec {
    Spec::new("label.*", transform(from_raw("labels"), one_metric_per_label), Attribute)
}

fn pod_specs() -> Vec<Spec> {
    let mut specs = network_specs();
    specs.extend([
        Spec::new("createdAt", transform(from_raw("createdAt"), to_timestamp), Gauge),
        Spec::new("startTime", transform(from_raw("startTime"), to_timestamp), Gauge),
        raw("createdKind", "createdKind", Attribute),
        raw("createdBy", "createdBy", Attribute),
        raw("nodeIP", "nodeIP", Attribute),
        raw("namespace", "namespace", Attribute),
        raw("nodeName", "nodeName", Attribute),
        raw("podName", "podName", Attribute),
        Spec::new("isReady", transform(from_raw("isReady"), to_numeric_boolean), Gauge),
        raw("status", "status", Attribute),
        Spec::new(
            "isScheduled",
            transform(from_raw("isScheduled"), to_numeric_boolean),
            Gauge,
        ),
        raw("deploymentName", "deploymentName", Attribute),
        labels_spec(),
    ]);
    specs
}

fn container_specs() -> Vec<Spec> {
    let mut specs = vec![
        raw("memoryUsedBytes", "usageBytes", Gauge),
        raw("memoryWorkingSetBytes", "workingSetBytes", Gauge),
        Spec::new("cpuUsedCores", transform(from_raw("usageNanoCores"), from_nano), Gauge),
    ];
    specs.extend(fs_specs("fs"));
    specs.extend([
        Spec::new(
            "fsUsedPercent",
            to_complement_percentage("fsUsedBytes", "fsAvailableBytes"),
            Gauge,
        ),
        raw("containerID", "containerID", Attribute),
        raw("containerImageID", "containerImageID", Attribute),
        raw("containerName", "containerName", Attribute),
        raw("containerImage", "containerImage", Attribute),
        raw("deploymentName", "deploymentName", Attribute),
        raw("namespace", "namespace", Attribute),
        raw("podName", "podName", Attribute),
        raw("nodeName", "nodeName", Attribute),
        raw("nodeIP", "nodeIP", Attribute),
        raw("restartCount", "restartCount", Gauge),
        Spec::new(
            "cpuRequestedCores",
            transform(from_raw("cpuRequestedCores"), to_cores),
            Gauge,
        ),
        Spec::new("cpuLimitCores", transform(from_raw("cpuLimitCores"), to_cores), Gauge),
        raw("memoryRequestedBytes", "memoryRequestedBytes", Gauge),
        raw("memoryLimitBytes", "memoryLimitBytes", Gauge),
        raw("status", "status", Attribute),
        Spec::new("isReady", transform(from_raw("isReady"), to_numeric_boolean), Gauge),
        raw("reason", "reason", Attribute),
        Spec::new("startedAt", transform(from_raw("startedAt"), to_timestamp), Gauge),
        labels_spec(),
    ]);
    specs
}

fn node_specs() -> Vec<Spec> {
    let mut specs = vec![
        raw("nodeName", "nodeName", Attribute),
        Spec::new("cpuUsedCores", transform(from_raw("usageNanoCores"), from_nano), Gauge),
        Spec::new(
            "cpuUsedCoreMilliseconds",
            transform(from_raw("usageCoreNanoSeconds"), from_nano_to_milli),
            Gauge,
        ),
        raw("memoryUsedBytes", "memoryUsageBytes", Gauge),
        raw("memoryAvailableBytes", "memoryAvailableBytes", Gauge),
        raw("memoryWorkingSetBytes", "memoryWorkingSetBytes", Gauge),
        raw("memoryRssBytes", "memoryRssBytes", Gauge),
        raw("memoryPageFaults", "memoryPageFaults", Gauge),
        raw("memoryMajorPageFaultsPerSecond", "memoryMajorPageFaults", Rate),
    ];
    specs.extend(network_specs());
    specs.extend(fs_specs("fs"));
    specs.extend(fs_specs("runtime"));
    specs.push(labels_spec());
    specs
}

fn volume_specs() -> Vec<Spec> {
    let mut specs = vec![
        raw("volumeName", "volumeName", Attribute),
        raw("podName", "podName", Attribute),
        raw("namespace", "namespace", Attribute),
        Spec::new("persistent", is_persistent_volume(), Attribute),
        raw("pvcName", "pvcName", Attribute),
        raw("pvcNamespace", "pvcNamespace", Attribute),
    ];
    specs.extend(fs_specs("fs"));
    specs.push(Spec::new(
        "fsUsedPercent",
        to_complement_percentage("fsUsedBytes", "fsAvailableBytes"),
        Gauge,
    ));
    specs
}

/// Spec groups populated from the kubelet
pub fn kubelet_specs() -> SpecGroups {
    let mut specs = SpecGroups::new();
    specs.insert(
        "pod".into(),
        SpecGroup::new(pod_specs())
            .with_id_generator(pod_entity_id)
            .with_type_generator(entity_type),
    );
    specs.insert(
        "container".into(),
        SpecGroup::new(container_specs())
            .with_id_generator(container_entity_id)
            .with_type_generator(entity_type),
    );
    specs.insert(
        "node".into(),
        SpecGroup::new(node_specs()).with_type_generator(entity_type),
    );
    specs.insert(
        "volume".into(),
        SpecGroup::new(volume_specs()).with_type_generator(entity_type),
    );
    specs
}

/// Series kept from the kubelet cAdvisor exposition
///
/// Series without a container label describe the pod cgroup and are dropped.
/// Older kubelets label containers `container_name`, newer ones `container`.
pub fn cadvisor_queries() -> Vec<Query> {
    vec![
        Query::new("container_memory_usage_bytes")
            .with_labels(LabelOperator::Nor, [("container_name", "")]),
        Query::new("container_memory_usage_bytes")
            .with_labels(LabelOperator::Nor, [("container", "")]),
    ]
}

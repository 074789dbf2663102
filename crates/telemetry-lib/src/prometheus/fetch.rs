use super::Sample;
use crate::definition::{raw_metric, FetchError, FetchFn};
use crate::models::{FetchedValue, RawGroups, RawValue, Scalar};
use std::collections::BTreeMap;
use std::sync::Arc;

const LABEL_PREFIX: &str = "label_";

fn sample<'a>(
    groups: &'a RawGroups,
    group: &str,
    entity_id: &str,
    metric: &str,
) -> Result<&'a Sample, FetchError> {
    match raw_metric(groups, group, entity_id, metric)? {
        RawValue::Sample(sample) => Ok(sample),
        other => Err(FetchError::IncompatibleType {
            metric: metric.to_string(),
            expected: "sample",
            found: other.kind(),
        }),
    }
}

fn label_value(
    groups: &RawGroups,
    group: &str,
    entity_id: &str,
    metric: &str,
    label: &str,
) -> Result<String, FetchError> {
    sample(groups, group, entity_id, metric)?
        .labels
        .get(label)
        .cloned()
        .ok_or_else(|| FetchError::LabelNotFound {
            metric: metric.to_string(),
            label: label.to_string(),
        })
}

/// Numeric value of the sample stored under `metric`
pub fn from_value(metric: impl Into<String>) -> FetchFn {
    let metric = metric.into();
    Arc::new(move |group, entity_id, groups| {
        sample(groups, group, entity_id, &metric).map(|s| FetchedValue::from(s.value))
    })
}

/// Value of `label` on the sample stored under `metric`
pub fn from_label_value(metric: impl Into<String>, label: impl Into<String>) -> FetchFn {
    let metric = metric.into();
    let label = label.into();
    Arc::new(move |group, entity_id, groups| {
        label_value(groups, group, entity_id, &metric, &label).map(FetchedValue::from)
    })
}

/// Raw ID of the entity in `parent_group` that owns this entity
///
/// Looks at the first sample of the entity carrying the labels needed to
/// build the parent's ID.
fn parent_entity_id(
    parent_group: &str,
    group: &str,
    entity_id: &str,
    groups: &RawGroups,
) -> Result<String, FetchError> {
    if parent_group == group {
        return Ok(entity_id.to_string());
    }

    let metrics = groups
        .get(group)
        .and_then(|entities| entities.get(entity_id))
        .ok_or_else(|| FetchError::EntityNotFound {
            group: group.to_string(),
            entity_id: entity_id.to_string(),
        })?;

    let parent = metrics.values().find_map(|value| match value {
        RawValue::Sample(s) => {
            let namespace = s.labels.get("namespace")?;
            if parent_group == "namespace" {
                Some(namespace.clone())
            } else {
                let name = s.labels.get(parent_group)?;
                Some(format!("{}_{}", namespace, name))
            }
        }
        _ => None,
    });

    parent.ok_or_else(|| FetchError::LabelNotFound {
        metric: format!("{}/{}", group, entity_id),
        label: parent_group.to_string(),
    })
}

/// Copy the `label_*` labels of `metric` on the parent entity as `label.<name>`
pub fn inherit_all_labels_from(
    parent_group: impl Into<String>,
    metric: impl Into<String>,
) -> FetchFn {
    let parent_group = parent_group.into();
    let metric = metric.into();
    Arc::new(move |group, entity_id, groups| {
        let parent_id = parent_entity_id(&parent_group, group, entity_id, groups)?;
        let parent = sample(groups, &parent_group, &parent_id, &metric)?;

        let labels: BTreeMap<String, Scalar> = parent
            .labels
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(LABEL_PREFIX)
                    .map(|stripped| (format!("label.{}", stripped), Scalar::from(value.as_str())))
            })
            .collect();

        Ok(FetchedValue::Multi(labels))
    })
}

/// Entity ID taken from a label value
pub fn from_label_value_entity_id_generator(
    metric: impl Into<String>,
    label: impl Into<String>,
) -> impl Fn(&str, &str, &RawGroups) -> Result<String, FetchError> + Send + Sync + 'static {
    let metric = metric.into();
    let label = label.into();
    move |group, entity_id, groups| label_value(groups, group, entity_id, &metric, &label)
}

/// Entity type built from the cluster name and the `namespace` label of `metric`
pub fn from_label_value_entity_type_generator(
    metric: impl Into<String>,
) -> impl Fn(&str, &str, &RawGroups, &str) -> Result<String, FetchError> + Send + Sync + 'static {
    let metric = metric.into();
    move |group, entity_id, groups, cluster| match group {
        "namespace" => Ok(format!("k8s:{}:{}", cluster, group)),
        "container" => {
            let namespace = label_value(groups, group, entity_id, &metric, "namespace")?;
            let pod = label_value(groups, group, entity_id, &metric, "pod")?;
            Ok(format!("k8s:{}:{}:{}:{}", cluster, namespace, pod, group))
        }
        _ => {
            let namespace = label_value(groups, group, entity_id, &metric, "namespace")?;
            Ok(format!("k8s:{}:{}:{}", cluster, namespace, group))
        }
    }
}

/// Entity ID of a pod that is still pending; any other pod is an error
pub fn pending_pod_entity_id_generator(
) -> impl Fn(&str, &str, &RawGroups) -> Result<String, FetchError> + Send + Sync + 'static {
    move |group, entity_id, groups| {
        let phase = label_value(groups, group, entity_id, "kube_pod_status_phase", "phase")?;
        if phase != "Pending" {
            return Err(FetchError::Transform(format!(
                "ignoring pod {} in phase {}",
                entity_id, phase
            )));
        }
        label_value(groups, group, entity_id, "kube_pod_info", "pod")
    }
}

/// Deployment owning a ReplicaSet, derived from the ReplicaSet name
pub fn deployment_name_for_replicaset() -> FetchFn {
    Arc::new(|group, entity_id, groups| {
        let name = label_value(
            groups,
            group,
            entity_id,
            "kube_replicaset_created",
            "replicaset",
        )?;
        Ok(FetchedValue::from(replicaset_to_deployment_name(&name)))
    })
}

/// Deployment owning a pod, empty unless the pod was created by a ReplicaSet
pub fn deployment_name_for_pod() -> FetchFn {
    Arc::new(|group, entity_id, groups| {
        let kind = label_value(groups, group, entity_id, "kube_pod_info", "created_by_kind")?;
        let name = label_value(groups, group, entity_id, "kube_pod_info", "created_by_name")?;
        Ok(FetchedValue::from(deployment_name_from_creator(&kind, &name)))
    })
}

/// Deployment name implied by a pod's creator
pub fn deployment_name_from_creator(kind: &str, name: &str) -> String {
    if kind == "ReplicaSet" {
        replicaset_to_deployment_name(name)
    } else {
        String::new()
    }
}

/// Strip the pod-template hash suffix from a ReplicaSet name
fn replicaset_to_deployment_name(name: &str) -> String {
    match name.rsplit_once('-') {
        Some((deployment, _hash)) => deployment.to_string(),
        None => String::new(),
    }
}

//! The metric catalog: what gets published for each source
//!
//! Spec tables and query catalogs are plain data built once by
//! [`Catalog::standard`] and handed to the collection pass by reference.

mod ksm;
mod kubelet;
mod transforms;

#[cfg(test)]
mod tests;

pub use ksm::{ksm_queries, ksm_specs};
pub use kubelet::{
    cadvisor_queries, container_entity_id, entity_type as kubelet_entity_type, kubelet_specs,
    pod_entity_id,
};
pub use transforms::{
    from_nano, from_nano_to_milli, is_persistent_volume, one_metric_per_label,
    to_complement_percentage, to_cores, to_numeric_boolean, to_timestamp,
};

use crate::definition::{EntityKey, FetchError, MetricSet, MetricSetError, Populator, SpecGroups};
use crate::models::{MetricType, RawGroups, Scalar};
use crate::prometheus::Query;

/// Spec tables and query catalogs for both sources
#[derive(Debug, Clone)]
pub struct Catalog {
    pub ksm_specs: SpecGroups,
    pub ksm_queries: Vec<Query>,
    pub kubelet_specs: SpecGroups,
    pub cadvisor_queries: Vec<Query>,
}

impl Catalog {
    pub fn standard() -> Self {
        Self {
            ksm_specs: ksm_specs(),
            ksm_queries: ksm_queries(),
            kubelet_specs: kubelet_specs(),
            cadvisor_queries: cadvisor_queries(),
        }
    }

    /// Populator with the Kubernetes event types and naming manipulators
    pub fn populator(&self, cluster_name: impl Into<String>) -> Populator {
        Populator::new(cluster_name, k8s_metric_set_type_guesser)
            .with_manipulator(cluster_name_manipulator)
            .with_manipulator(naming_manipulator)
    }
}

/// `K8s<Group>Sample`, e.g. `K8sPodSample`
pub fn k8s_metric_set_type_guesser(
    _cluster: &str,
    group: &str,
    _entity_id: &str,
    _groups: &RawGroups,
) -> Result<String, FetchError> {
    let mut chars = group.chars();
    let title: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => return Err(FetchError::Transform("empty group label".into())),
    };
    Ok(format!("K8s{}Sample", title))
}

pub fn cluster_name_manipulator(
    metric_set: &mut MetricSet,
    _entity: &EntityKey,
    cluster: &str,
) -> Result<(), MetricSetError> {
    metric_set.set_metric("clusterName", Scalar::from(cluster), MetricType::Attribute)
}

/// `displayName` is the entity name, `entityName` is `<type>:<name>`
pub fn naming_manipulator(
    metric_set: &mut MetricSet,
    entity: &EntityKey,
    _cluster: &str,
) -> Result<(), MetricSetError> {
    metric_set.set_metric(
        "displayName",
        Scalar::from(entity.name.as_str()),
        MetricType::Attribute,
    )?;
    metric_set.set_metric(
        "entityName",
        Scalar::from(format!("{}:{}", entity.entity_type, entity.name)),
        MetricType::Attribute,
    )
}

use super::transforms::to_numeric_boolean;
use crate::definition::{transform, Spec, SpecGroup, SpecGroups};
use crate::models::MetricType::{Attribute, Gauge};
use crate::prometheus::{
    deployment_name_for_pod, deployment_name_for_replicaset, from_label_value,
    from_label_value_entity_id_generator, from_label_value_entity_type_generator, from_value,
    inherit_all_labels_from, pending_pod_entity_id_generator, LabelOperator, Query,
};

/// Spec groups populated from kube-state-metrics
pub fn ksm_specs() -> SpecGroups {
    let mut specs = SpecGroups::new();

    specs.insert(
        "replicaset".into(),
        SpecGroup::new(vec![
            Spec::new("createdAt", from_value("kube_replicaset_created"), Gauge),
            Spec::new("podsDesired", from_value("kube_replicaset_spec_replicas"), Gauge),
            Spec::new("podsReady", from_value("kube_replicaset_status_ready_replicas"), Gauge),
            Spec::new("podsTotal", from_value("kube_replicaset_status_replicas"), Gauge),
            Spec::new(
                "podsFullyLabeled",
                from_value("kube_replicaset_status_fully_labeled_replicas"),
                Gauge,
            ),
            Spec::new(
                "observedGeneration",
                from_value("kube_replicaset_status_observed_generation"),
                Gauge,
            ),
            Spec::new(
                "replicasetName",
                from_label_value("kube_replicaset_created", "replicaset"),
                Attribute,
            ),
            Spec::new(
                "namespace",
                from_label_value("kube_replicaset_created", "namespace"),
                Attribute,
            ),
            Spec::new("deploymentName", deployment_name_for_replicaset(), Attribute),
        ])
        .with_id_generator(from_label_value_entity_id_generator(
            "kube_replicaset_created",
            "replicaset",
        ))
        .with_type_generator(from_label_value_entity_type_generator("kube_replicaset_created")),
    );

    specs.insert(
        "namespace".into(),
        SpecGroup::new(vec![
            Spec::new("createdAt", from_value("kube_namespace_created"), Gauge),
            Spec::new(
                "namespace",
                from_label_value("kube_namespace_created", "namespace"),
                Attribute,
            ),
            Spec::new(
                "status",
                from_label_value("kube_namespace_status_phase", "phase"),
                Attribute,
            ),
            Spec::new(
                "label.*",
                inherit_all_labels_from("namespace", "kube_namespace_labels"),
                Attribute,
            ),
        ])
        .with_type_generator(from_label_value_entity_type_generator("kube_namespace_created")),
    );

    specs.insert(
        "deployment".into(),
        SpecGroup::new(vec![
            Spec::new("podsDesired", from_value("kube_deployment_spec_replicas"), Gauge),
            Spec::new("createdAt", from_value("kube_deployment_created"), Gauge),
            Spec::new("podsTotal", from_value("kube_deployment_status_replicas"), Gauge),
            Spec::new(
                "podsAvailable",
                from_value("kube_deployment_status_replicas_available"),
                Gauge,
            ),
            Spec::new(
                "podsUnavailable",
                from_value("kube_deployment_status_replicas_unavailable"),
                Gauge,
            ),
            Spec::new(
                "podsUpdated",
                from_value("kube_deployment_status_replicas_updated"),
                Gauge,
            ),
            Spec::new(
                "podsMaxUnavailable",
                from_value("kube_deployment_spec_strategy_rollingupdate_max_unavailable"),
                Gauge,
            ),
            Spec::new(
                "namespace",
                from_label_value("kube_deployment_labels", "namespace"),
                Attribute,
            ),
            Spec::new(
                "deploymentName",
                from_label_value("kube_deployment_labels", "deployment"),
                Attribute,
            ),
            // deployment labels come last so they win over namespace labels
            Spec::new(
                "label.*",
                inherit_all_labels_from("namespace", "kube_namespace_labels"),
                Attribute,
            ),
            Spec::new(
                "label.*",
                inherit_all_labels_from("deployment", "kube_deployment_labels"),
                Attribute,
            ),
        ])
        .with_id_generator(from_label_value_entity_id_generator(
            "kube_deployment_created",
            "deployment",
        ))
        .with_type_generator(from_label_value_entity_type_generator("kube_deployment_created")),
    );

    // Pending pods are not on any node yet, so no kubelet reports them
    specs.insert(
        "pod".into(),
        SpecGroup::new(vec![
            Spec::new("createdAt", from_value("kube_pod_created"), Gauge),
            Spec::new("startTime", from_value("kube_pod_start_time"), Gauge),
            Spec::new(
                "createdKind",
                from_label_value("kube_pod_info", "created_by_kind"),
                Attribute,
            ),
            Spec::new(
                "createdBy",
                from_label_value("kube_pod_info", "created_by_name"),
                Attribute,
            ),
            Spec::new("nodeIP", from_label_value("kube_pod_info", "host_ip"), Attribute),
            Spec::new("namespace", from_label_value("kube_pod_info", "namespace"), Attribute),
            Spec::new("nodeName", from_label_value("kube_pod_info", "node"), Attribute),
            Spec::new("podName", from_label_value("kube_pod_info", "pod"), Attribute),
            Spec::new(
                "isReady",
                transform(
                    from_label_value("kube_pod_status_ready", "condition"),
                    to_numeric_boolean,
                ),
                Gauge,
            ),
            Spec::new(
                "status",
                from_label_value("kube_pod_status_phase", "phase"),
                Attribute,
            ),
            Spec::new(
                "isScheduled",
                transform(
                    from_label_value("kube_pod_status_scheduled", "condition"),
                    to_numeric_boolean,
                ),
                Gauge,
            ),
            Spec::new("deploymentName", deployment_name_for_pod(), Attribute),
            Spec::new(
                "label.*",
                inherit_all_labels_from("pod", "kube_pod_labels"),
                Attribute,
            ),
        ])
        .with_id_generator(pending_pod_entity_id_generator())
        .with_type_generator(from_label_value_entity_type_generator("kube_pod_status_phase")),
    );

    specs
}

/// Series kept from the kube-state-metrics exposition
pub fn ksm_queries() -> Vec<Query> {
    let mut queries: Vec<Query> = [
        "kube_replicaset_spec_replicas",
        "kube_replicaset_status_ready_replicas",
        "kube_replicaset_status_replicas",
        "kube_replicaset_status_fully_labeled_replicas",
        "kube_replicaset_status_observed_generation",
        "kube_replicaset_created",
        "kube_namespace_created",
        "kube_deployment_created",
        "kube_deployment_spec_replicas",
        "kube_deployment_status_replicas",
        "kube_deployment_status_replicas_available",
        "kube_deployment_status_replicas_unavailable",
        "kube_deployment_status_replicas_updated",
        "kube_deployment_spec_strategy_rollingupdate_max_unavailable",
        "kube_pod_info",
        "kube_pod_created",
        "kube_pod_labels",
        "kube_pod_start_time",
    ]
    .into_iter()
    .map(Query::new)
    .collect();

    // Only the series describing the current state, which KSM marks with 1
    for name in [
        "kube_namespace_labels",
        "kube_namespace_status_phase",
        "kube_deployment_labels",
        "kube_pod_status_scheduled",
        "kube_pod_status_ready",
    ] {
        queries.push(Query::new(name).with_value(1.0));
    }

    queries.push(
        Query::new("kube_pod_status_phase")
            .with_labels(LabelOperator::And, [("phase", "Pending")])
            .with_value(1.0),
    );

    queries
}

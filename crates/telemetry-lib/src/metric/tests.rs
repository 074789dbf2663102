use super::*;
use crate::definition::{EntityStore, MetricValue, PopulateError};
use crate::grouper::group_by_labels;
use crate::models::{FetchedValue, RawMetrics, RawValue};
use crate::prometheus::{execute_queries, parse_exposition, Sample};
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;

const KSM_METRICS: &str = include_str!("../../tests/fixtures/ksm_metrics.txt");

fn scalar(v: impl Into<FetchedValue>) -> FetchedValue {
    v.into()
}

#[test]
fn test_cpu_transforms() {
    assert_eq!(from_nano(scalar(228_759_290u64)).unwrap(), scalar(0.22875929));
    assert_eq!(
        from_nano_to_milli(scalar(22_332_102_208_229u64)).unwrap(),
        scalar(22_332_102.208229)
    );
    assert_eq!(to_cores(scalar(101i64)).unwrap(), scalar(0.101));
    assert!(from_nano(scalar("lots")).is_err());
    assert!(to_cores(scalar(0.5)).is_err());
}

#[test]
fn test_to_timestamp() {
    let t = Utc.with_ymd_and_hms(2018, 2, 14, 16, 27, 38).unwrap();

    assert_eq!(
        to_timestamp(FetchedValue::Scalar(Scalar::Timestamp(t))).unwrap(),
        scalar(1_518_625_658i64)
    );
    assert!(to_timestamp(scalar("2018-02-14")).is_err());
}

#[test]
fn test_numeric_boolean() {
    for truthy in [scalar("true"), scalar("True"), scalar(true), scalar(1i64)] {
        assert_eq!(to_numeric_boolean(truthy).unwrap(), scalar(1i64));
    }
    for falsy in [scalar("false"), scalar("False"), scalar(false), scalar(0u64)] {
        assert_eq!(to_numeric_boolean(falsy).unwrap(), scalar(0i64));
    }
    assert!(to_numeric_boolean(scalar("Unknown")).is_err());
    assert!(to_numeric_boolean(scalar(2i64)).is_err());
}

#[test]
fn test_one_metric_per_label() {
    let labels = FetchedValue::Multi(BTreeMap::from([
        ("app".to_string(), "web".into()),
        ("tier".to_string(), "frontend".into()),
    ]));

    let FetchedValue::Multi(metrics) = one_metric_per_label(labels).unwrap() else {
        panic!("expected multiple values");
    };

    assert_eq!(
        metrics.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["label.app", "label.tier"]
    );
    assert!(one_metric_per_label(scalar("app=web")).is_err());
}

fn volume(metrics: &[(&str, RawValue)]) -> RawGroups {
    let raw: RawMetrics = metrics
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    RawGroups::from([(
        "volume".to_string(),
        BTreeMap::from([("default_web-0_data".to_string(), raw)]),
    )])
}

#[test]
fn test_complement_percentage() {
    let percent = to_complement_percentage("fsUsedBytes", "fsAvailableBytes");

    let groups = volume(&[
        ("fsUsedBytes", RawValue::UInt(25)),
        ("fsAvailableBytes", RawValue::UInt(75)),
    ]);
    assert_eq!(
        percent("volume", "default_web-0_data", &groups).unwrap(),
        scalar(25.0)
    );

    let empty = volume(&[
        ("fsUsedBytes", RawValue::UInt(0)),
        ("fsAvailableBytes", RawValue::UInt(0)),
    ]);
    let err = percent("volume", "default_web-0_data", &empty).unwrap_err();
    assert_eq!(
        err.to_string(),
        "error computing percentage for fsUsedBytes & fsAvailableBytes: division by zero"
    );

    let missing = volume(&[("fsUsedBytes", RawValue::UInt(1))]);
    assert!(matches!(
        percent("volume", "default_web-0_data", &missing),
        Err(FetchError::MetricNotFound { metric, .. }) if metric == "fsAvailableBytes"
    ));
}

#[test]
fn test_persistent_volume_flag() {
    let persistent = is_persistent_volume();

    let claimed = volume(&[("pvcName", RawValue::Str("data-claim".into()))]);
    assert_eq!(
        persistent("volume", "default_web-0_data", &claimed).unwrap(),
        scalar("true")
    );

    let ephemeral = volume(&[("volumeName", RawValue::Str("data".into()))]);
    assert_eq!(
        persistent("volume", "default_web-0_data", &ephemeral).unwrap(),
        scalar("false")
    );
}

fn kubelet_groups() -> RawGroups {
    let pod: RawMetrics = [
        ("namespace", RawValue::from("kube-system")),
        ("podName", RawValue::from("kube-dns-54b7bd9f7f-rb9x7")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut container = pod.clone();
    container.insert("containerName".into(), RawValue::from("kubedns"));

    RawGroups::from([
        (
            "pod".to_string(),
            BTreeMap::from([("kube-system_kube-dns-54b7bd9f7f-rb9x7".to_string(), pod)]),
        ),
        (
            "container".to_string(),
            BTreeMap::from([(
                "kube-system_kube-dns-54b7bd9f7f-rb9x7_kubedns".to_string(),
                container,
            )]),
        ),
        (
            "node".to_string(),
            BTreeMap::from([("minikube".to_string(), RawMetrics::new())]),
        ),
    ])
}

#[test]
fn test_kubelet_entity_generators() {
    let groups = kubelet_groups();
    let pod = "kube-system_kube-dns-54b7bd9f7f-rb9x7";
    let container = "kube-system_kube-dns-54b7bd9f7f-rb9x7_kubedns";

    assert_eq!(pod_entity_id("pod", pod, &groups).unwrap(), "kube-dns-54b7bd9f7f-rb9x7");
    assert_eq!(container_entity_id("container", container, &groups).unwrap(), "kubedns");

    assert_eq!(
        kubelet_entity_type("pod", pod, &groups, "prod").unwrap(),
        "k8s:prod:kube-system:pod"
    );
    assert_eq!(
        kubelet_entity_type("container", container, &groups, "prod").unwrap(),
        "k8s:prod:kube-system:kube-dns-54b7bd9f7f-rb9x7:container"
    );
    assert_eq!(
        kubelet_entity_type("node", "minikube", &groups, "prod").unwrap(),
        "k8s:prod:node"
    );
}

#[test]
fn test_pod_id_outside_its_namespace() {
    let mut groups = kubelet_groups();
    let pods = groups.get_mut("pod").unwrap();
    let metrics = pods.remove("kube-system_kube-dns-54b7bd9f7f-rb9x7").unwrap();
    pods.insert("default_kube-dns".to_string(), metrics);

    assert!(pod_entity_id("pod", "default_kube-dns", &groups).is_err());
}

#[test]
fn test_metric_set_type_guesser() {
    let groups = RawGroups::new();

    assert_eq!(
        k8s_metric_set_type_guesser("prod", "replicaset", "x", &groups).unwrap(),
        "K8sReplicasetSample"
    );
    assert_eq!(
        k8s_metric_set_type_guesser("prod", "pod", "x", &groups).unwrap(),
        "K8sPodSample"
    );
    assert!(k8s_metric_set_type_guesser("prod", "", "x", &groups).is_err());
}

#[test]
fn test_manipulators() {
    let key = EntityKey {
        name: "kube-dns".into(),
        entity_type: "k8s:prod:kube-system:pod".into(),
    };
    let mut ms = MetricSet::new("K8sPodSample");

    cluster_name_manipulator(&mut ms, &key, "prod").unwrap();
    naming_manipulator(&mut ms, &key, "prod").unwrap();

    assert_eq!(ms.get("clusterName"), Some(&MetricValue::Text("prod".into())));
    assert_eq!(ms.get("displayName"), Some(&MetricValue::Text("kube-dns".into())));
    assert_eq!(
        ms.get("entityName"),
        Some(&MetricValue::Text("k8s:prod:kube-system:pod:kube-dns".into()))
    );
}

#[test]
fn test_cadvisor_queries_drop_pod_cgroups() {
    let queries = cadvisor_queries();
    let keep = |sample: &Sample| queries.iter().any(|q| q.matches("container_memory_usage_bytes", sample));

    assert!(keep(&Sample::new(1.0).with_label("container_name", "nginx")));
    assert!(keep(&Sample::new(1.0).with_label("container", "nginx")));
    assert!(!keep(&Sample::new(1.0).with_label("container_name", "").with_label("pod_name", "web-0")));
    assert!(!keep(&Sample::new(1.0).with_label("container", "")));
}

fn populate_ksm() -> (EntityStore, Vec<PopulateError>) {
    let catalog = Catalog::standard();
    let families = execute_queries(parse_exposition(KSM_METRICS).unwrap(), &catalog.ksm_queries);
    let mut labels: Vec<&str> = catalog.ksm_specs.keys().map(String::as_str).collect();
    labels.sort_unstable();
    let groups = group_by_labels(&labels, &families);

    let mut store = EntityStore::new();
    let outcome = catalog
        .populator("minikube")
        .populate(&groups, &catalog.ksm_specs, &mut store);
    assert!(outcome.populated);
    (store, outcome.errors)
}

fn metric(store: &EntityStore, name: &str, entity_type: &str, metric: &str) -> Option<MetricValue> {
    store
        .find(name, entity_type)?
        .metric_sets()
        .first()?
        .get(metric)
        .cloned()
}

fn text(v: &str) -> Option<MetricValue> {
    Some(MetricValue::Text(v.to_string()))
}

#[test]
fn test_ksm_catalog_populates_workloads() {
    let (store, _) = populate_ksm();

    let rs = "k8s:minikube:kube-system:replicaset";
    let rs_name = "kube-state-metrics-57f4659995";
    assert_eq!(metric(&store, rs_name, rs, "podsDesired"), Some(MetricValue::Float(1.0)));
    assert_eq!(metric(&store, rs_name, rs, "deploymentName"), text("kube-state-metrics"));
    assert_eq!(metric(&store, rs_name, rs, "event_type"), None);
    assert_eq!(
        store.find(rs_name, rs).unwrap().metric_sets()[0].event_type(),
        "K8sReplicasetSample"
    );

    let ns = "k8s:minikube:namespace";
    assert_eq!(metric(&store, "kube-system", ns, "status"), text("Active"));
    assert_eq!(metric(&store, "kube-system", ns, "label.team"), text("platform"));
    assert_eq!(
        metric(&store, "kube-system", ns, "entityName"),
        text("k8s:minikube:namespace:kube-system")
    );

    let deploy = "k8s:minikube:kube-system:deployment";
    assert_eq!(
        metric(&store, "kube-state-metrics", deploy, "createdAt"),
        Some(MetricValue::Float(1.518625658e9))
    );
    assert_eq!(
        metric(&store, "kube-state-metrics", deploy, "label.k8s_app"),
        text("kube-state-metrics")
    );
    assert_eq!(
        metric(&store, "kube-state-metrics", deploy, "clusterName"),
        text("minikube")
    );
}

#[test]
fn test_ksm_catalog_only_reports_pending_pods() {
    let (store, errors) = populate_ksm();

    let pod = "k8s:minikube:default:pod";
    let name = "web-5d8f9c7b6-x2x2x";
    assert_eq!(metric(&store, name, pod, "status"), text("Pending"));
    assert_eq!(metric(&store, name, pod, "isScheduled"), Some(MetricValue::Int(0)));
    assert_eq!(metric(&store, name, pod, "isReady"), Some(MetricValue::Int(0)));
    assert_eq!(metric(&store, name, pod, "deploymentName"), text("web"));
    assert_eq!(metric(&store, name, pod, "label.app"), text("web"));

    assert!(store
        .entities()
        .iter()
        .all(|e| e.name() != "kube-state-metrics-57f4659995-6n2qq"));
    assert!(errors.iter().any(|e| matches!(
        e,
        PopulateError::EntityId { group, entity_id, .. }
            if group == "pod" && entity_id == "kube-system_kube-state-metrics-57f4659995-6n2qq"
    )));
    // missing series are reported per metric, not per entity
    assert!(errors.iter().any(|e| matches!(
        e,
        PopulateError::Fetch { metric, .. } if metric == "startTime"
    )));
}

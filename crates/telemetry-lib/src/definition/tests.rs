use super::*;
use crate::models::{MetricType, RawMetrics, RawValue, Scalar};
use std::collections::BTreeMap;

fn raw_groups() -> RawGroups {
    let mut groups = RawGroups::new();
    let entities = groups.entry("test".to_string()).or_default();

    let mut first = RawMetrics::new();
    first.insert("raw_metric_name_1".into(), RawValue::Int(1));
    first.insert("raw_metric_name_2".into(), RawValue::Str("metric_value_2".into()));
    entities.insert("entity_id_1".into(), first);

    let mut second = RawMetrics::new();
    second.insert("raw_metric_name_1".into(), RawValue::Int(2));
    second.insert("raw_metric_name_2".into(), RawValue::Str("metric_value_4".into()));
    entities.insert("entity_id_2".into(), second);

    groups
}

fn group_type_generator(group: &str, _id: &str, _g: &RawGroups, cluster: &str) -> Result<String, FetchError> {
    Ok(format!("{}:{}", cluster, group))
}

fn title_guesser(_cluster: &str, group: &str, _id: &str, _g: &RawGroups) -> Result<String, FetchError> {
    let mut chars = group.chars();
    let title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    Ok(format!("{}Sample", title))
}

fn populator() -> Populator {
    Populator::new("playground", title_guesser)
        .with_manipulator(|ms, key, _cluster| {
            ms.set_metric("displayName", Scalar::from(key.name.as_str()), MetricType::Attribute)?;
            ms.set_metric(
                "entityName",
                Scalar::from(format!("{}:{}", key.entity_type, key.name)),
                MetricType::Attribute,
            )
        })
        .with_manipulator(|ms, _key, cluster| {
            ms.set_metric("clusterName", Scalar::from(cluster), MetricType::Attribute)
        })
}

fn specs() -> SpecGroups {
    let mut specs = SpecGroups::new();
    specs.insert(
        "test".to_string(),
        SpecGroup::new(vec![
            Spec::new("metric_1", from_raw("raw_metric_name_1"), MetricType::Gauge),
            Spec::new("metric_2", from_raw("raw_metric_name_2"), MetricType::Attribute),
        ])
        .with_type_generator(group_type_generator),
    );
    specs
}

#[test]
fn test_populate_creates_entities_with_metric_sets() {
    let mut store = EntityStore::new();
    let outcome = populator().populate(&raw_groups(), &specs(), &mut store);

    assert!(outcome.populated);
    assert!(outcome.errors.is_empty());
    assert_eq!(store.len(), 2);

    let entity = store.find("entity_id_1", "playground:test").unwrap();
    assert_eq!(entity.metric_sets().len(), 1);
    let ms = &entity.metric_sets()[0];
    assert_eq!(ms.event_type(), "TestSample");
    assert_eq!(ms.get("metric_1"), Some(&MetricValue::Int(1)));
    assert_eq!(
        ms.get("metric_2"),
        Some(&MetricValue::Text("metric_value_2".into()))
    );
    assert_eq!(
        ms.get("entityName"),
        Some(&MetricValue::Text("playground:test:entity_id_1".into()))
    );
    assert_eq!(ms.get("displayName"), Some(&MetricValue::Text("entity_id_1".into())));
    assert_eq!(ms.get("clusterName"), Some(&MetricValue::Text("playground".into())));
}

#[test]
fn test_incompatible_declared_type_is_a_partial_result() {
    let mut groups = RawGroups::new();
    let mut metrics = RawMetrics::new();
    metrics.insert("raw_metric_name_1".into(), RawValue::Int(1));
    metrics.insert("raw_metric_name_2".into(), RawValue::Str("v".into()));
    groups
        .entry("pod".into())
        .or_default()
        .insert("entity_id_1".into(), metrics);

    let mut specs = SpecGroups::new();
    specs.insert(
        "pod".into(),
        SpecGroup::new(vec![
            Spec::new("metric_1", from_raw("raw_metric_name_1"), MetricType::Gauge),
            Spec::new("metric_2", from_raw("raw_metric_name_2"), MetricType::Gauge),
        ])
        .with_type_generator(group_type_generator),
    );

    let mut store = EntityStore::new();
    let outcome = Populator::new("playground", title_guesser).populate(&groups, &specs, &mut store);

    assert!(outcome.populated);
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(
        &outcome.errors[0],
        PopulateError::SetMetric { metric, .. } if metric == "metric_2"
    ));

    let entity = store.find("entity_id_1", "playground:pod").unwrap();
    let ms = &entity.metric_sets()[0];
    assert_eq!(ms.len(), 1);
    assert_eq!(ms.get("metric_1"), Some(&MetricValue::Int(1)));
    assert_eq!(ms.get("metric_2"), None);
}

#[test]
fn test_unconfigured_groups_are_ignored() {
    let mut groups = raw_groups();
    groups
        .entry("other".into())
        .or_default()
        .insert("x".into(), RawMetrics::new());

    let mut store = EntityStore::new();
    let outcome = populator().populate(&groups, &specs(), &mut store);

    assert!(outcome.errors.is_empty());
    assert!(store.entities().iter().all(|e| e.entity_type() == "playground:test"));
}

#[test]
fn test_empty_groups_populate_nothing() {
    let mut store = EntityStore::new();
    let outcome = populator().populate(&RawGroups::new(), &specs(), &mut store);

    assert!(!outcome.populated);
    assert!(outcome.errors.is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_id_generator_failure_skips_only_that_entity() {
    let mut specs = specs();
    let group = specs.remove("test").unwrap().with_id_generator(|_group, raw_id, _groups| {
        if raw_id == "entity_id_1" {
            Err(FetchError::Transform("no id".into()))
        } else {
            Ok(format!("derived_{}", raw_id))
        }
    });
    specs.insert("test".into(), group);

    let mut store = EntityStore::new();
    let outcome = populator().populate(&raw_groups(), &specs, &mut store);

    assert!(outcome.populated);
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(outcome.errors[0], PopulateError::EntityId { .. }));
    assert_eq!(outcome.errors[0].entity_id(), "entity_id_1");
    assert_eq!(store.len(), 1);
    assert!(store.find("derived_entity_id_2", "playground:test").is_some());
}

#[test]
fn test_missing_type_generator_fails_entity_creation() {
    let mut specs = SpecGroups::new();
    specs.insert(
        "test".into(),
        SpecGroup::new(vec![Spec::new(
            "metric_1",
            from_raw("raw_metric_name_1"),
            MetricType::Gauge,
        )]),
    );

    let mut store = EntityStore::new();
    let outcome = populator().populate(&raw_groups(), &specs, &mut store);

    assert!(!outcome.populated);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome
        .errors
        .iter()
        .all(|e| matches!(e, PopulateError::Entity { .. })));
    assert!(outcome.errors[0]
        .to_string()
        .contains("entity name and type are required"));
}

#[test]
fn test_entities_without_metrics_are_not_populated() {
    let mut specs = SpecGroups::new();
    specs.insert(
        "test".into(),
        SpecGroup::new(vec![Spec::new(
            "missing",
            from_raw("does_not_exist"),
            MetricType::Gauge,
        )])
        .with_type_generator(group_type_generator),
    );

    let mut store = EntityStore::new();
    let outcome = populator().populate(&raw_groups(), &specs, &mut store);

    assert!(!outcome.populated);
    assert_eq!(store.len(), 2);
    assert!(store.entities().iter().all(|e| e.metric_sets().is_empty()));
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.errors[0]
        .to_string()
        .contains("error fetching value for metric missing"));
}

#[test]
fn test_multi_value_fetch_sets_each_key() {
    let mut groups = RawGroups::new();
    let mut metrics = RawMetrics::new();
    metrics.insert(
        "labels".into(),
        RawValue::Labels(BTreeMap::from([
            ("app".to_string(), "web".to_string()),
            ("tier".to_string(), "front".to_string()),
        ])),
    );
    groups
        .entry("test".into())
        .or_default()
        .insert("e".into(), metrics);

    let label_fetch = transform(from_raw("labels"), |value| match value {
        FetchedValue::Multi(labels) => Ok(FetchedValue::Multi(
            labels
                .into_iter()
                .map(|(k, v)| (format!("label.{}", k), v))
                .collect(),
        )),
        other => Ok(other),
    });

    let mut specs = SpecGroups::new();
    specs.insert(
        "test".into(),
        SpecGroup::new(vec![Spec::new("label.*", label_fetch, MetricType::Attribute)])
            .with_type_generator(group_type_generator),
    );

    let mut store = EntityStore::new();
    let outcome = Populator::new("c", title_guesser).populate(&groups, &specs, &mut store);

    assert!(outcome.populated);
    let ms = &store.find("e", "c:test").unwrap().metric_sets()[0];
    assert_eq!(ms.len(), 2);
    assert_eq!(ms.get("label.app"), Some(&MetricValue::Text("web".into())));
    assert_eq!(ms.metric_type("label.tier"), Some(MetricType::Attribute));
    assert_eq!(ms.get("label.*"), None);
}

#[test]
fn test_manipulator_errors_are_recorded() {
    let populator = Populator::new("c", title_guesser)
        .with_manipulator(|_ms, _key, _cluster| Err(MetricSetError::Rejected("boom".into())));

    let mut store = EntityStore::new();
    let outcome = populator.populate(&raw_groups(), &specs(), &mut store);

    assert!(outcome.populated);
    assert_eq!(
        outcome
            .errors
            .iter()
            .filter(|e| matches!(e, PopulateError::Manipulator { .. }))
            .count(),
        2
    );
}

#[test]
fn test_from_raw_missing_metric_error() {
    let err = from_raw("nope")("test", "entity_id_1", &raw_groups()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "metric not found. SpecGroup: test, EntityID: entity_id_1, Metric: nope"
    );
}

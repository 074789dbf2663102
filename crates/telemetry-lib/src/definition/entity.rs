use crate::models::{MetricType, Scalar};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

const EVENT_TYPE_KEY: &str = "event_type";
const METRIC_TYPES_KEY: &str = "metric_types";

/// Rejected metric writes
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricSetError {
    #[error("non-numeric value for rate/delta/gauge metrics: {name}={value}")]
    NonNumeric { name: String, value: String },

    #[error("non-string value for attribute metrics: {name}={value}")]
    NonString { name: String, value: String },

    #[error("metric name is reserved: {0}")]
    Reserved(String),

    #[error("{0}")]
    Rejected(String),
}

/// Entity creation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity name and type are required when defining one")]
    MissingKey,
}

/// Value of a published metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

/// A named bag of typed metrics attached to an entity
///
/// Serializes flat next to `event_type`, with the declared type of every
/// metric under `metric_types` so consumers can tell rates from gauges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSet {
    event_type: String,
    #[serde(flatten)]
    metrics: BTreeMap<String, MetricValue>,
    #[serde(rename = "metric_types", skip_serializing_if = "BTreeMap::is_empty")]
    types: BTreeMap<String, MetricType>,
}

impl MetricSet {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            metrics: BTreeMap::new(),
            types: BTreeMap::new(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Store `value` under `name`, validating it against `metric_type`
    ///
    /// Gauges and rates take numbers; timestamps are stored as unix seconds
    /// and booleans as 0/1. Attributes take strings only.
    pub fn set_metric(
        &mut self,
        name: &str,
        value: Scalar,
        metric_type: MetricType,
    ) -> Result<(), MetricSetError> {
        if name == EVENT_TYPE_KEY || name == METRIC_TYPES_KEY {
            return Err(MetricSetError::Reserved(name.to_string()));
        }

        let stored = match metric_type {
            MetricType::Gauge | MetricType::Rate => match value {
                Scalar::Int(v) => MetricValue::Int(v),
                Scalar::UInt(v) => MetricValue::UInt(v),
                Scalar::Float(v) if v.is_finite() => MetricValue::Float(v),
                Scalar::Bool(v) => MetricValue::Int(i64::from(v)),
                Scalar::Timestamp(t) => MetricValue::Int(t.timestamp()),
                other => {
                    return Err(MetricSetError::NonNumeric {
                        name: name.to_string(),
                        value: other.to_string(),
                    })
                }
            },
            MetricType::Attribute => match value {
                Scalar::Str(v) => MetricValue::Text(v),
                other => {
                    return Err(MetricSetError::NonString {
                        name: name.to_string(),
                        value: other.to_string(),
                    })
                }
            },
        };

        self.metrics.insert(name.to_string(), stored);
        self.types.insert(name.to_string(), metric_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    pub fn metric_type(&self, name: &str) -> Option<MetricType> {
        self.types.get(name).copied()
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Identity of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    entity: EntityKey,
    metrics: Vec<MetricSet>,
}

impl Entity {
    pub fn key(&self) -> &EntityKey {
        &self.entity
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity.entity_type
    }

    pub fn metric_sets(&self) -> &[MetricSet] {
        &self.metrics
    }

    pub fn add_metric_set(&mut self, metric_set: MetricSet) {
        self.metrics.push(metric_set);
    }
}

/// Entities produced during one collection pass, in creation order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntityStore {
    entities: Vec<Entity>,
    #[serde(skip)]
    index: HashMap<EntityKey, usize>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the entity with this name and type, creating it if absent
    pub fn entity(&mut self, name: &str, entity_type: &str) -> Result<&mut Entity, EntityError> {
        if name.is_empty() || entity_type.is_empty() {
            return Err(EntityError::MissingKey);
        }

        let key = EntityKey {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
        };
        let index = match self.index.get(&key) {
            Some(&index) => index,
            None => {
                let index = self.entities.len();
                self.index.insert(key.clone(), index);
                self.entities.push(Entity {
                    entity: key,
                    metrics: Vec::new(),
                });
                index
            }
        };

        Ok(&mut self.entities[index])
    }

    pub fn find(&self, name: &str, entity_type: &str) -> Option<&Entity> {
        let key = EntityKey {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
        };
        self.index.get(&key).map(|&index| &self.entities[index])
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_gauge_rejects_strings() {
        let mut ms = MetricSet::new("K8sPodSample");
        let err = ms
            .set_metric("cpu", Scalar::from("high"), MetricType::Gauge)
            .unwrap_err();
        assert!(matches!(err, MetricSetError::NonNumeric { .. }));
        assert!(ms.is_empty());
    }

    #[test]
    fn test_attribute_rejects_numbers() {
        let mut ms = MetricSet::new("K8sPodSample");
        let err = ms
            .set_metric("status", Scalar::from(1i64), MetricType::Attribute)
            .unwrap_err();
        assert!(matches!(err, MetricSetError::NonString { .. }));
    }

    #[test]
    fn test_gauge_coerces_bool_and_timestamp() {
        let mut ms = MetricSet::new("K8sPodSample");
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ms.set_metric("isReady", Scalar::from(true), MetricType::Gauge)
            .unwrap();
        ms.set_metric("startTime", Scalar::Timestamp(t), MetricType::Gauge)
            .unwrap();

        assert_eq!(ms.get("isReady"), Some(&MetricValue::Int(1)));
        assert_eq!(ms.get("startTime"), Some(&MetricValue::Int(1704067200)));
        assert_eq!(ms.metric_type("startTime"), Some(MetricType::Gauge));
    }

    #[test]
    fn test_event_type_is_reserved() {
        let mut ms = MetricSet::new("K8sPodSample");
        assert!(ms
            .set_metric("event_type", Scalar::from("x"), MetricType::Attribute)
            .is_err());
    }

    #[test]
    fn test_metric_set_serializes_flat() {
        let mut ms = MetricSet::new("K8sNodeSample");
        ms.set_metric("memoryUsedBytes", Scalar::from(1024u64), MetricType::Gauge)
            .unwrap();
        ms.set_metric("nodeName", Scalar::from("n1"), MetricType::Attribute)
            .unwrap();

        let json = serde_json::to_value(&ms).unwrap();
        assert_eq!(json["event_type"], "K8sNodeSample");
        assert_eq!(json["memoryUsedBytes"], 1024);
        assert_eq!(json["nodeName"], "n1");
    }

    #[test]
    fn test_declared_types_are_published() {
        let mut ms = MetricSet::new("K8sNodeSample");
        ms.set_metric("net.rxBytesPerSecond", Scalar::from(4096u64), MetricType::Rate)
            .unwrap();
        ms.set_metric("memoryUsedBytes", Scalar::from(1024u64), MetricType::Gauge)
            .unwrap();

        let json = serde_json::to_value(&ms).unwrap();
        assert_eq!(json["net.rxBytesPerSecond"], 4096);
        assert_eq!(json["metric_types"]["net.rxBytesPerSecond"], "rate");
        assert_eq!(json["metric_types"]["memoryUsedBytes"], "gauge");

        let empty = serde_json::to_value(MetricSet::new("K8sNodeSample")).unwrap();
        assert!(empty.get("metric_types").is_none());
    }

    #[test]
    fn test_metric_types_key_is_reserved() {
        let mut ms = MetricSet::new("K8sPodSample");
        let err = ms
            .set_metric("metric_types", Scalar::from(1i64), MetricType::Gauge)
            .unwrap_err();
        assert_eq!(err, MetricSetError::Reserved("metric_types".to_string()));
    }

    #[test]
    fn test_store_reuses_entities() {
        let mut store = EntityStore::new();
        store.entity("web", "k8s:c:default:pod").unwrap();
        store.entity("web", "k8s:c:default:pod").unwrap();
        store.entity("web", "k8s:c:other:pod").unwrap();
        assert_eq!(store.len(), 2);

        assert_eq!(store.entity("", "t").unwrap_err(), EntityError::MissingKey);
        assert_eq!(store.entity("n", "").unwrap_err(), EntityError::MissingKey);
    }

    #[test]
    fn test_store_lookup_keeps_creation_order() {
        let mut store = EntityStore::new();
        for i in 0..500 {
            store.entity(&format!("pod-{}", i), "k8s:c:default:pod").unwrap();
        }
        store.entity("pod-42", "k8s:c:default:pod").unwrap();
        store.entity("node-1", "k8s:c:node").unwrap();

        assert_eq!(store.len(), 501);
        assert_eq!(store.entities()[0].name(), "pod-0");
        assert_eq!(store.entities()[499].name(), "pod-499");
        assert_eq!(store.entities()[500].name(), "node-1");

        let pod = store.find("pod-42", "k8s:c:default:pod").unwrap();
        assert_eq!(pod.name(), "pod-42");
        assert!(store.find("pod-42", "k8s:c:node").is_none());
        assert!(store.find("pod-500", "k8s:c:default:pod").is_none());
    }
}

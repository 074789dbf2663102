//! Declarative metric definitions and the population engine
//!
//! A [`SpecGroups`] table maps each group label of [`RawGroups`] to the
//! generators that derive entity identity and to the ordered list of metrics
//! to publish for entities of that group. The [`Populator`] walks the table.

mod entity;
mod populate;

#[cfg(test)]
mod tests;

pub use entity::{Entity, EntityError, EntityKey, EntityStore, MetricSet, MetricSetError, MetricValue};
pub use populate::{
    MetricSetManipulator, MetricSetTypeGuesser, PopulateError, PopulateOutcome, Populator,
};

use crate::models::{FetchedValue, MetricType, RawGroups, RawValue, Scalar};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors deriving a value, an entity ID or an entity type from raw groups
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("entity not found. SpecGroup: {group}, EntityID: {entity_id}")]
    EntityNotFound { group: String, entity_id: String },

    #[error("metric not found. SpecGroup: {group}, EntityID: {entity_id}, Metric: {metric}")]
    MetricNotFound {
        group: String,
        entity_id: String,
        metric: String,
    },

    #[error("label {label} not found in metric {metric}")]
    LabelNotFound { metric: String, label: String },

    #[error("incompatible value type for {metric}: expected {expected}, found {found}")]
    IncompatibleType {
        metric: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Transform(String),
}

/// (group label, raw entity ID, raw groups) -> value
pub type FetchFn =
    Arc<dyn Fn(&str, &str, &RawGroups) -> Result<FetchedValue, FetchError> + Send + Sync>;

/// (group label, raw entity ID, raw groups) -> derived entity ID
pub type IdGenerator =
    Arc<dyn Fn(&str, &str, &RawGroups) -> Result<String, FetchError> + Send + Sync>;

/// (group label, raw entity ID, raw groups, cluster name) -> entity type
pub type TypeGenerator =
    Arc<dyn Fn(&str, &str, &RawGroups, &str) -> Result<String, FetchError> + Send + Sync>;

/// One published metric: its name, where its value comes from, and its type
#[derive(Clone)]
pub struct Spec {
    /// Metric name; may be a wildcard such as `label.*` for multi-value fetches
    pub name: String,
    pub fetch: FetchFn,
    pub metric_type: MetricType,
}

impl Spec {
    pub fn new(name: impl Into<String>, fetch: FetchFn, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            fetch,
            metric_type,
        }
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spec")
            .field("name", &self.name)
            .field("metric_type", &self.metric_type)
            .finish_non_exhaustive()
    }
}

/// Definition of one entity group
#[derive(Clone, Default)]
pub struct SpecGroup {
    pub id_generator: Option<IdGenerator>,
    pub type_generator: Option<TypeGenerator>,
    pub specs: Vec<Spec>,
}

impl SpecGroup {
    pub fn new(specs: Vec<Spec>) -> Self {
        Self {
            id_generator: None,
            type_generator: None,
            specs,
        }
    }

    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str, &str, &RawGroups) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    pub fn with_type_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str, &str, &RawGroups, &str) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        self.type_generator = Some(Arc::new(generator));
        self
    }
}

impl fmt::Debug for SpecGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecGroup")
            .field("id_generator", &self.id_generator.is_some())
            .field("type_generator", &self.type_generator.is_some())
            .field("specs", &self.specs)
            .finish()
    }
}

/// Group label -> definition
pub type SpecGroups = HashMap<String, SpecGroup>;

/// Look up one raw metric of an entity
pub fn raw_metric<'a>(
    groups: &'a RawGroups,
    group: &str,
    entity_id: &str,
    key: &str,
) -> Result<&'a RawValue, FetchError> {
    let metrics = groups
        .get(group)
        .and_then(|entities| entities.get(entity_id))
        .ok_or_else(|| FetchError::EntityNotFound {
            group: group.to_string(),
            entity_id: entity_id.to_string(),
        })?;

    metrics.get(key).ok_or_else(|| FetchError::MetricNotFound {
        group: group.to_string(),
        entity_id: entity_id.to_string(),
        metric: key.to_string(),
    })
}

/// Look up a raw metric that must hold a string
pub fn raw_string<'a>(
    groups: &'a RawGroups,
    group: &str,
    entity_id: &str,
    key: &str,
) -> Result<&'a str, FetchError> {
    match raw_metric(groups, group, entity_id, key)? {
        RawValue::Str(s) => Ok(s),
        other => Err(FetchError::IncompatibleType {
            metric: key.to_string(),
            expected: "string",
            found: other.kind(),
        }),
    }
}

/// Convert a raw value into a fetched value
///
/// Label maps become multi-value results keyed by label name; exposition
/// samples yield their numeric value.
pub fn fetched_from_raw(value: &RawValue) -> FetchedValue {
    match value {
        RawValue::Int(v) => Scalar::Int(*v).into(),
        RawValue::UInt(v) => Scalar::UInt(*v).into(),
        RawValue::Float(v) => Scalar::Float(*v).into(),
        RawValue::Str(v) => Scalar::Str(v.clone()).into(),
        RawValue::Bool(v) => Scalar::Bool(*v).into(),
        RawValue::Timestamp(v) => Scalar::Timestamp(*v).into(),
        RawValue::Labels(labels) => FetchedValue::Multi(
            labels
                .iter()
                .map(|(k, v)| (k.clone(), Scalar::Str(v.clone())))
                .collect::<BTreeMap<_, _>>(),
        ),
        RawValue::Sample(sample) => Scalar::Float(sample.value).into(),
    }
}

/// Fetch the raw metric `key` of the entity unchanged
pub fn from_raw(key: impl Into<String>) -> FetchFn {
    let key = key.into();
    Arc::new(move |group, entity_id, groups| {
        raw_metric(groups, group, entity_id, &key).map(fetched_from_raw)
    })
}

/// Apply `transform` to the result of `fetch`
pub fn transform<F>(fetch: FetchFn, transform: F) -> FetchFn
where
    F: Fn(FetchedValue) -> Result<FetchedValue, FetchError> + Send + Sync + 'static,
{
    Arc::new(move |group, entity_id, groups| {
        let value = fetch(group, entity_id, groups)?;
        transform(value)
    })
}

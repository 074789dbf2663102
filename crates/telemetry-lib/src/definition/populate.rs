use super::entity::{EntityError, EntityKey, EntityStore, MetricSet, MetricSetError};
use super::{FetchError, SpecGroup, SpecGroups};
use crate::models::{FetchedValue, RawGroups, Scalar};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// (cluster name, group label, raw entity ID, raw groups) -> metric set event type
pub type MetricSetTypeGuesser =
    Arc<dyn Fn(&str, &str, &str, &RawGroups) -> Result<String, FetchError> + Send + Sync>;

/// Adjusts a fresh metric set before spec metrics are written to it
pub type MetricSetManipulator =
    Arc<dyn Fn(&mut MetricSet, &EntityKey, &str) -> Result<(), MetricSetError> + Send + Sync>;

/// One recorded population failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PopulateError {
    #[error("[{group}] error generating entity ID for: {entity_id}: {source}")]
    EntityId {
        group: String,
        entity_id: String,
        source: FetchError,
    },

    #[error("[{group}] error generating entity type for: {entity_id}: {source}")]
    EntityType {
        group: String,
        entity_id: String,
        source: FetchError,
    },

    #[error("[{group}] entity id: {entity_id}: {source}")]
    Entity {
        group: String,
        entity_id: String,
        source: EntityError,
    },

    #[error("[{group}] entity id: {entity_id}: error guessing metric set type: {source}")]
    MetricSetType {
        group: String,
        entity_id: String,
        source: FetchError,
    },

    #[error("[{group}] entity id: {entity_id}: metric set manipulator failed: {source}")]
    Manipulator {
        group: String,
        entity_id: String,
        source: MetricSetError,
    },

    #[error("[{group}] entity id: {entity_id}: error fetching value for metric {metric}: {source}")]
    Fetch {
        group: String,
        entity_id: String,
        metric: String,
        source: FetchError,
    },

    #[error(
        "[{group}] entity id: {entity_id}: error setting metric {metric} with value {value} in metric set: {source}"
    )]
    SetMetric {
        group: String,
        entity_id: String,
        metric: String,
        value: String,
        source: MetricSetError,
    },
}

impl PopulateError {
    pub fn group(&self) -> &str {
        match self {
            PopulateError::EntityId { group, .. }
            | PopulateError::EntityType { group, .. }
            | PopulateError::Entity { group, .. }
            | PopulateError::MetricSetType { group, .. }
            | PopulateError::Manipulator { group, .. }
            | PopulateError::Fetch { group, .. }
            | PopulateError::SetMetric { group, .. } => group,
        }
    }

    /// Raw entity ID the failure belongs to
    pub fn entity_id(&self) -> &str {
        match self {
            PopulateError::EntityId { entity_id, .. }
            | PopulateError::EntityType { entity_id, .. }
            | PopulateError::Entity { entity_id, .. }
            | PopulateError::MetricSetType { entity_id, .. }
            | PopulateError::Manipulator { entity_id, .. }
            | PopulateError::Fetch { entity_id, .. }
            | PopulateError::SetMetric { entity_id, .. } => entity_id,
        }
    }
}

/// Result of one population run
#[derive(Debug, Default)]
pub struct PopulateOutcome {
    /// Whether at least one metric was written anywhere
    pub populated: bool,
    pub errors: Vec<PopulateError>,
}

/// Turns raw groups into entities and metric sets according to spec groups
#[derive(Clone)]
pub struct Populator {
    cluster_name: String,
    type_guesser: MetricSetTypeGuesser,
    manipulators: Vec<MetricSetManipulator>,
}

impl Populator {
    pub fn new<G>(cluster_name: impl Into<String>, type_guesser: G) -> Self
    where
        G: Fn(&str, &str, &str, &RawGroups) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        Self {
            cluster_name: cluster_name.into(),
            type_guesser: Arc::new(type_guesser),
            manipulators: Vec::new(),
        }
    }

    /// Append a manipulator; manipulators run in the order they were added
    pub fn with_manipulator<M>(mut self, manipulator: M) -> Self
    where
        M: Fn(&mut MetricSet, &EntityKey, &str) -> Result<(), MetricSetError>
            + Send
            + Sync
            + 'static,
    {
        self.manipulators.push(Arc::new(manipulator));
        self
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Populate `store` from `groups`
    ///
    /// Groups without a spec group are ignored. Failures never abort the run;
    /// each one is recorded and processing moves on to the next spec or entity.
    pub fn populate(
        &self,
        groups: &RawGroups,
        specs: &SpecGroups,
        store: &mut EntityStore,
    ) -> PopulateOutcome {
        let mut outcome = PopulateOutcome::default();

        for (group, entities) in groups {
            let Some(spec_group) = specs.get(group) else {
                trace!(group = %group, "No spec group, skipping");
                continue;
            };

            for raw_id in entities.keys() {
                if self.populate_entity(group, raw_id, spec_group, groups, store, &mut outcome.errors)
                {
                    outcome.populated = true;
                }
            }
        }

        outcome
    }

    fn populate_entity(
        &self,
        group: &str,
        raw_id: &str,
        spec_group: &SpecGroup,
        groups: &RawGroups,
        store: &mut EntityStore,
        errors: &mut Vec<PopulateError>,
    ) -> bool {
        let entity_id = match &spec_group.id_generator {
            Some(generator) => match generator(group, raw_id, groups) {
                Ok(id) => id,
                Err(source) => {
                    errors.push(PopulateError::EntityId {
                        group: group.to_string(),
                        entity_id: raw_id.to_string(),
                        source,
                    });
                    return false;
                }
            },
            None => raw_id.to_string(),
        };

        let entity_type = match &spec_group.type_generator {
            Some(generator) => match generator(group, raw_id, groups, &self.cluster_name) {
                Ok(entity_type) => entity_type,
                Err(source) => {
                    errors.push(PopulateError::EntityType {
                        group: group.to_string(),
                        entity_id: raw_id.to_string(),
                        source,
                    });
                    return false;
                }
            },
            None => String::new(),
        };

        let entity = match store.entity(&entity_id, &entity_type) {
            Ok(entity) => entity,
            Err(source) => {
                errors.push(PopulateError::Entity {
                    group: group.to_string(),
                    entity_id: raw_id.to_string(),
                    source,
                });
                return false;
            }
        };

        let event_type = match (self.type_guesser)(&self.cluster_name, group, raw_id, groups) {
            Ok(event_type) => event_type,
            Err(source) => {
                errors.push(PopulateError::MetricSetType {
                    group: group.to_string(),
                    entity_id: raw_id.to_string(),
                    source,
                });
                return false;
            }
        };

        let mut metric_set = MetricSet::new(event_type);
        let key = entity.key().clone();
        for manipulator in &self.manipulators {
            if let Err(source) = manipulator(&mut metric_set, &key, &self.cluster_name) {
                errors.push(PopulateError::Manipulator {
                    group: group.to_string(),
                    entity_id: raw_id.to_string(),
                    source,
                });
            }
        }

        let populated = populate_metric_set(&mut metric_set, group, raw_id, spec_group, groups, errors);
        if populated {
            entity.add_metric_set(metric_set);
        }
        populated
    }
}

fn populate_metric_set(
    metric_set: &mut MetricSet,
    group: &str,
    raw_id: &str,
    spec_group: &SpecGroup,
    groups: &RawGroups,
    errors: &mut Vec<PopulateError>,
) -> bool {
    let mut populated = false;

    let mut set = |name: &str, value: Scalar, errors: &mut Vec<PopulateError>, spec_type| {
        let shown = value.to_string();
        match metric_set.set_metric(name, value, spec_type) {
            Ok(()) => true,
            Err(source) => {
                errors.push(PopulateError::SetMetric {
                    group: group.to_string(),
                    entity_id: raw_id.to_string(),
                    metric: name.to_string(),
                    value: shown,
                    source,
                });
                false
            }
        }
    };

    for spec in &spec_group.specs {
        let value = match (spec.fetch)(group, raw_id, groups) {
            Ok(value) => value,
            Err(source) => {
                errors.push(PopulateError::Fetch {
                    group: group.to_string(),
                    entity_id: raw_id.to_string(),
                    metric: spec.name.clone(),
                    source,
                });
                continue;
            }
        };

        match value {
            FetchedValue::Scalar(value) => {
                populated |= set(&spec.name, value, errors, spec.metric_type);
            }
            FetchedValue::Multi(values) => {
                for (name, value) in values {
                    populated |= set(&name, value, errors, spec.metric_type);
                }
            }
        }
    }

    populated
}

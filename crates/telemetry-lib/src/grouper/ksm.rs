use super::{GroupError, GroupOutcome, Grouper};
use crate::client::SourceClient;
use crate::definition::SpecGroups;
use crate::discovery::Source;
use crate::models::{RawGroups, RawValue};
use crate::prometheus::{self, MetricFamily, Query};
use async_trait::async_trait;
use tracing::debug;

pub const METRICS_PATH: &str = "/metrics";

/// Groups kube-state-metrics series by the spec groups' labels
pub struct KsmGrouper {
    client: SourceClient,
    queries: Vec<Query>,
}

impl KsmGrouper {
    pub fn new(client: SourceClient, queries: Vec<Query>) -> Self {
        Self { client, queries }
    }
}

#[async_trait]
impl Grouper for KsmGrouper {
    fn source(&self) -> Source {
        Source::KubeStateMetrics
    }

    async fn group(&self, specs: &SpecGroups) -> Result<GroupOutcome, GroupError> {
        let families = prometheus::fetch_families(&self.client, METRICS_PATH, &self.queries).await?;
        if families.is_empty() {
            return Err(GroupError::NoData(Source::KubeStateMetrics));
        }

        let mut labels: Vec<&str> = specs.keys().map(String::as_str).collect();
        labels.sort_unstable();

        let groups = group_by_labels(&labels, &families);

        debug!(
            families = families.len(),
            groups = groups.len(),
            "Grouped kube-state-metrics data"
        );

        Ok(GroupOutcome {
            groups,
            errors: Vec::new(),
        })
    }
}

/// Raw entity ID of a sample within `group`
fn entity_id(group: &str, sample: &prometheus::Sample) -> String {
    match group {
        "namespace" => sample.label(group).to_string(),
        "container" => format!(
            "{}_{}_{}",
            sample.label("namespace"),
            sample.label("pod"),
            sample.label(group)
        ),
        _ => format!("{}_{}", sample.label("namespace"), sample.label(group)),
    }
}

/// Put every sample carrying a group's label into that group
///
/// A sample can land in several groups (a pod series also carries the
/// namespace label). Within one entity a later sample of the same metric
/// replaces an earlier one.
pub(crate) fn group_by_labels(group_labels: &[&str], families: &[MetricFamily]) -> RawGroups {
    let mut groups = RawGroups::new();

    for group in group_labels {
        for family in families {
            for sample in &family.samples {
                if !sample.labels.contains_key(*group) {
                    continue;
                }

                groups
                    .entry(group.to_string())
                    .or_default()
                    .entry(entity_id(group, sample))
                    .or_default()
                    .insert(family.name.clone(), RawValue::Sample(sample.clone()));
            }
        }
    }

    groups
}

//! Text exposition format support
//!
//! Parsing is delegated to `prometheus-parse`; this module adds the query
//! catalog used to select the series each source cares about, and the fetch
//! helpers that read samples out of `RawGroups`.

mod fetch;

pub use fetch::{
    deployment_name_for_pod, deployment_name_for_replicaset, deployment_name_from_creator,
    from_label_value, from_label_value_entity_id_generator, from_label_value_entity_type_generator,
    from_value, inherit_all_labels_from, pending_pod_entity_id_generator,
};

use crate::client::{ClientError, SourceClient};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Errors reading an exposition payload
#[derive(Debug, Error)]
pub enum PrometheusError {
    #[error("failed to fetch metrics from {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to parse metrics exposition: {0}")]
    Parse(#[from] std::io::Error),
}

/// One sample with a scalar value
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub labels: BTreeMap<String, String>,
}

impl Sample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            labels: BTreeMap::new(),
        }
    }

    /// Add a label (builder style, mostly for tests and fixtures)
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Label value, with a missing label reading as the empty string
    pub fn label(&self, name: &str) -> &str {
        self.labels.get(name).map(String::as_str).unwrap_or("")
    }
}

/// All kept samples of one metric name
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub samples: Vec<Sample>,
}

/// How the labels of a query are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelOperator {
    /// Every label must be equal
    #[default]
    And,
    /// At least one label must be equal
    Or,
    /// No label may be equal
    Nor,
}

/// Label predicate of a query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryLabels {
    pub operator: LabelOperator,
    pub labels: BTreeMap<String, String>,
}

impl QueryLabels {
    fn matches(&self, sample: &Sample) -> bool {
        if self.labels.is_empty() {
            return true;
        }

        let mut equal = self
            .labels
            .iter()
            .map(|(name, value)| sample.label(name) == value);

        match self.operator {
            LabelOperator::And => equal.all(|eq| eq),
            LabelOperator::Or => equal.any(|eq| eq),
            LabelOperator::Nor => !equal.any(|eq| eq),
        }
    }
}

/// Selects samples of one metric name from a scrape
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub metric_name: String,
    pub labels: QueryLabels,
    /// Keep only samples with exactly this value
    pub value: Option<f64>,
}

impl Query {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            labels: QueryLabels::default(),
            value: None,
        }
    }

    pub fn with_labels<I, K, V>(mut self, operator: LabelOperator, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = QueryLabels {
            operator,
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Whether a sample named `metric` is selected by this query
    pub fn matches(&self, metric: &str, sample: &Sample) -> bool {
        if metric != self.metric_name {
            return false;
        }
        if let Some(expected) = self.value {
            if sample.value != expected {
                return false;
            }
        }
        self.labels.matches(sample)
    }
}

/// Parse an exposition payload into (metric name, sample) pairs
///
/// Histogram and summary series are skipped; only scalar series are kept.
pub fn parse_exposition(text: &str) -> Result<Vec<(String, Sample)>, PrometheusError> {
    let lines = text.lines().map(|line| Ok(line.to_owned()));
    let scrape = prometheus_parse::Scrape::parse(lines)?;

    let samples = scrape
        .samples
        .into_iter()
        .filter_map(|s| {
            let value = match s.value {
                prometheus_parse::Value::Counter(v)
                | prometheus_parse::Value::Gauge(v)
                | prometheus_parse::Value::Untyped(v) => v,
                _ => return None,
            };
            let labels = s
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Some((s.metric, Sample { value, labels }))
        })
        .collect();

    Ok(samples)
}

/// Keep the samples selected by any query, grouped by metric name
///
/// A sample selected by more than one query is kept once. Families come out
/// in the order their metric first appears in the query catalog.
pub fn execute_queries(samples: Vec<(String, Sample)>, queries: &[Query]) -> Vec<MetricFamily> {
    let mut families: Vec<MetricFamily> = Vec::new();

    for query in queries {
        if !families.iter().any(|f| f.name == query.metric_name) {
            families.push(MetricFamily {
                name: query.metric_name.clone(),
                samples: Vec::new(),
            });
        }
    }

    for (metric, sample) in samples {
        if !queries.iter().any(|q| q.matches(&metric, &sample)) {
            continue;
        }
        if let Some(family) = families.iter_mut().find(|f| f.name == metric) {
            family.samples.push(sample);
        }
    }

    families.retain(|f| !f.samples.is_empty());
    families
}

/// Fetch `path` from a source and run the query catalog over it
pub async fn fetch_families(
    client: &SourceClient,
    path: &str,
    queries: &[Query],
) -> Result<Vec<MetricFamily>, PrometheusError> {
    let body = client
        .get_text(path)
        .await
        .map_err(|source| PrometheusError::Fetch {
            path: path.to_string(),
            source,
        })?;

    let samples = parse_exposition(&body)?;
    let families = execute_queries(samples, queries);

    debug!(
        path = %path,
        families = families.len(),
        "Queried metrics exposition"
    );

    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"# HELP kube_pod_status_phase The pods current phase.
# TYPE kube_pod_status_phase gauge
kube_pod_status_phase{namespace="default",pod="web-1",phase="Pending"} 1
kube_pod_status_phase{namespace="default",pod="web-1",phase="Running"} 0
kube_pod_status_phase{namespace="default",pod="web-2",phase="Running"} 1
# TYPE container_memory_usage_bytes gauge
container_memory_usage_bytes{container_name="",namespace="default",pod_name="web-1"} 4096
container_memory_usage_bytes{container_name="app",namespace="default",pod_name="web-1"} 2048
# TYPE kube_namespace_created gauge
kube_namespace_created{namespace="default"} 1.5e+09
"#;

    #[test]
    fn test_parse_exposition_keeps_scalar_series() {
        let samples = parse_exposition(EXPOSITION).unwrap();
        assert_eq!(samples.len(), 6);

        let (_, sample) = samples
            .iter()
            .find(|(name, _)| name == "kube_namespace_created")
            .unwrap();
        assert_eq!(sample.value, 1.5e9);
        assert_eq!(sample.label("namespace"), "default");
    }

    #[test]
    fn test_query_and_operator_with_value() {
        let samples = parse_exposition(EXPOSITION).unwrap();
        let queries = vec![Query::new("kube_pod_status_phase")
            .with_labels(LabelOperator::And, [("phase", "Pending")])
            .with_value(1.0)];

        let families = execute_queries(samples, &queries);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].samples.len(), 1);
        assert_eq!(families[0].samples[0].label("pod"), "web-1");
    }

    #[test]
    fn test_query_nor_operator_excludes_matches() {
        let samples = parse_exposition(EXPOSITION).unwrap();
        let queries = vec![Query::new("container_memory_usage_bytes")
            .with_labels(LabelOperator::Nor, [("container_name", "")])];

        let families = execute_queries(samples, &queries);
        assert_eq!(families[0].samples.len(), 1);
        assert_eq!(families[0].samples[0].label("container_name"), "app");
    }

    #[test]
    fn test_query_or_operator() {
        let sample = Sample::new(1.0)
            .with_label("phase", "Running")
            .with_label("pod", "web-2");
        let query = Query::new("kube_pod_status_phase").with_labels(
            LabelOperator::Or,
            [("phase", "Pending"), ("pod", "web-2")],
        );

        assert!(query.matches("kube_pod_status_phase", &sample));
        assert!(!query.matches("kube_pod_info", &sample));
    }

    #[test]
    fn test_duplicate_queries_keep_sample_once() {
        let samples = parse_exposition(EXPOSITION).unwrap();
        let queries = vec![
            Query::new("kube_namespace_created"),
            Query::new("kube_namespace_created"),
        ];

        let families = execute_queries(samples, &queries);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].samples.len(), 1);
    }

    #[test]
    fn test_missing_label_reads_as_empty() {
        let sample = Sample::new(1.0);
        let query =
            Query::new("m").with_labels(LabelOperator::And, [("container_name", "")]);
        assert!(query.matches("m", &sample));
    }
}

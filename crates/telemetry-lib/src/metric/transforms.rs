//! Value transforms applied on top of raw fetches

use crate::definition::{from_raw, FetchError, FetchFn};
use crate::models::{FetchedValue, Scalar};
use std::collections::BTreeMap;
use std::sync::Arc;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
const NANOS_PER_MILLI: f64 = 1_000_000.0;
const MILLIS_PER_CORE: f64 = 1_000.0;

fn scalar(value: FetchedValue, what: &str) -> Result<Scalar, FetchError> {
    match value {
        FetchedValue::Scalar(s) => Ok(s),
        FetchedValue::Multi(_) => Err(FetchError::Transform(format!(
            "error transforming {}: multiple values",
            what
        ))),
    }
}

fn unsigned(value: FetchedValue, what: &str) -> Result<u64, FetchError> {
    match scalar(value, what)? {
        Scalar::UInt(v) => Ok(v),
        Scalar::Int(v) if v >= 0 => Ok(v as u64),
        _ => Err(FetchError::Transform(format!("error transforming {}", what))),
    }
}

/// Nanocores to cores
pub fn from_nano(value: FetchedValue) -> Result<FetchedValue, FetchError> {
    let v = unsigned(value, "to cpu cores")?;
    Ok(FetchedValue::from(v as f64 / NANOS_PER_SECOND))
}

/// Core nanoseconds to core milliseconds
pub fn from_nano_to_milli(value: FetchedValue) -> Result<FetchedValue, FetchError> {
    let v = unsigned(value, "cpu cores to milliseconds")?;
    Ok(FetchedValue::from(v as f64 / NANOS_PER_MILLI))
}

/// Timestamp to unix seconds
pub fn to_timestamp(value: FetchedValue) -> Result<FetchedValue, FetchError> {
    match scalar(value, "to timestamp")? {
        Scalar::Timestamp(t) => Ok(FetchedValue::from(t.timestamp())),
        _ => Err(FetchError::Transform("error transforming to timestamp".into())),
    }
}

/// `true`/`True`/1 to 1 and `false`/`False`/0 to 0
pub fn to_numeric_boolean(value: FetchedValue) -> Result<FetchedValue, FetchError> {
    let numeric = match scalar(value, "to numeric boolean")? {
        Scalar::Bool(b) => Some(i64::from(b)),
        Scalar::Str(s) => match s.as_str() {
            "true" | "True" => Some(1),
            "false" | "False" => Some(0),
            _ => None,
        },
        Scalar::Int(v @ (0 | 1)) => Some(v),
        Scalar::UInt(v @ (0 | 1)) => Some(v as i64),
        _ => None,
    };

    numeric.map(FetchedValue::from).ok_or_else(|| {
        FetchError::Transform("value can not be converted to numeric boolean".into())
    })
}

/// Millicores to cores
pub fn to_cores(value: FetchedValue) -> Result<FetchedValue, FetchError> {
    match scalar(value, "to cores")? {
        Scalar::Int(v) => Ok(FetchedValue::from(v as f64 / MILLIS_PER_CORE)),
        Scalar::UInt(v) => Ok(FetchedValue::from(v as f64 / MILLIS_PER_CORE)),
        _ => Err(FetchError::Transform("error transforming to cores".into())),
    }
}

/// A label map as one `label.<name>` metric per label
pub fn one_metric_per_label(value: FetchedValue) -> Result<FetchedValue, FetchError> {
    match value {
        FetchedValue::Multi(labels) => Ok(FetchedValue::Multi(
            labels
                .into_iter()
                .map(|(name, v)| (format!("label.{}", name), v))
                .collect::<BTreeMap<_, _>>(),
        )),
        FetchedValue::Scalar(_) => Err(FetchError::Transform(
            "error transforming labels: expected a label map".into(),
        )),
    }
}

/// `"true"` when the volume is backed by a persistent volume claim
pub fn is_persistent_volume() -> FetchFn {
    let pvc_name = from_raw("pvcName");
    Arc::new(move |group, entity_id, groups| {
        let persistent = matches!(
            pvc_name(group, entity_id, groups),
            Ok(FetchedValue::Scalar(Scalar::Str(name))) if !name.is_empty()
        );
        Ok(FetchedValue::from(if persistent { "true" } else { "false" }))
    })
}

/// `desired / (desired + complement) * 100`
pub fn to_complement_percentage(desired_metric: &str, complement_metric: &str) -> FetchFn {
    let desired_metric = desired_metric.to_string();
    let complement_metric = complement_metric.to_string();
    let complement = from_raw(complement_metric.clone());
    let desired = from_raw(desired_metric.clone());

    Arc::new(move |group, entity_id, groups| {
        let complement = unsigned(complement(group, entity_id, groups)?, &complement_metric)?;
        let desired = unsigned(desired(group, entity_id, groups)?, &desired_metric)?;

        let total = desired.saturating_add(complement);
        if total == 0 {
            return Err(FetchError::Transform(format!(
                "error computing percentage for {} & {}: division by zero",
                desired_metric, complement_metric
            )));
        }

        Ok(FetchedValue::from(desired as f64 / total as f64 * 100.0))
    })
}

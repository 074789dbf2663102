//! Core data models shared by the grouping and population stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::prometheus::Sample;

/// Raw metric name -> raw value for one entity
pub type RawMetrics = BTreeMap<String, RawValue>;

/// Group label -> entity ID -> raw metrics
///
/// Rebuilt from scratch on every collection pass.
pub type RawGroups = BTreeMap<String, BTreeMap<String, RawMetrics>>;

/// Untyped value as produced by a grouper
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Labels(BTreeMap<String, String>),
    /// One sample of the text exposition format
    Sample(Sample),
}

impl RawValue {
    /// Short name of the variant, used in type mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Int(_) => "int",
            RawValue::UInt(_) => "uint",
            RawValue::Float(_) => "float",
            RawValue::Str(_) => "string",
            RawValue::Bool(_) => "bool",
            RawValue::Timestamp(_) => "timestamp",
            RawValue::Labels(_) => "labels",
            RawValue::Sample(_) => "sample",
        }
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<u64> for RawValue {
    fn from(v: u64) -> Self {
        RawValue::UInt(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Str(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Str(v)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(v: DateTime<Utc>) -> Self {
        RawValue::Timestamp(v)
    }
}

/// A single fetched value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Int(_) => "int",
            Scalar::UInt(_) => "uint",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
            Scalar::Bool(_) => "bool",
            Scalar::Timestamp(_) => "timestamp",
        }
    }

    /// Numeric view of the scalar, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::UInt(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Str(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::UInt(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

/// Result of a spec's fetch function
///
/// `Multi` is used by specs that expand into several metrics, such as
/// `label.*`; each key becomes its own metric.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedValue {
    Scalar(Scalar),
    Multi(BTreeMap<String, Scalar>),
}

impl From<Scalar> for FetchedValue {
    fn from(v: Scalar) -> Self {
        FetchedValue::Scalar(v)
    }
}

macro_rules! fetched_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FetchedValue {
                fn from(v: $t) -> Self {
                    FetchedValue::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

fetched_from_scalar!(i64, u64, f64, bool, &str, String);

/// Declared semantic type of a published metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Gauge,
    Rate,
    Attribute,
}

/// Local classification of this node relative to the aggregation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Co-located with kube-state-metrics; collects cluster-wide data too
    Leader,
    Follower,
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => f.write_str("leader"),
            Role::Follower => f.write_str("follower"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_value_from_scalar_types() {
        assert_eq!(FetchedValue::from(1i64), FetchedValue::Scalar(Scalar::Int(1)));
        assert_eq!(
            FetchedValue::from("v"),
            FetchedValue::Scalar(Scalar::Str("v".to_string()))
        );
    }

    #[test]
    fn test_scalar_numeric_view() {
        assert_eq!(Scalar::UInt(3).as_f64(), Some(3.0));
        assert_eq!(Scalar::Str("3".into()).as_f64(), None);
        assert_eq!(Scalar::Bool(true).as_f64(), None);
    }
}

//! Per-node Kubernetes telemetry collection
//!
//! This crate provides the core functionality for:
//! - Locating the kubelet and kube-state-metrics, with a disk cache
//! - Deciding whether this node also collects cluster-wide data
//! - Grouping raw source data by entity
//! - Populating typed metric sets from declarative definitions

pub mod client;
pub mod definition;
pub mod discovery;
pub mod grouper;
pub mod metric;
pub mod models;
pub mod observability;
pub mod pass;
pub mod prometheus;

pub use definition::{Entity, EntityStore, MetricSet, MetricValue, Populator, SpecGroups};
pub use discovery::Source;
pub use metric::Catalog;
pub use models::*;
pub use observability::StructuredLogger;
pub use pass::{CollectionPass, CollectionPassBuilder, PassConfig, PassError, PassReport};

//! Raw metric grouping
//!
//! A grouper fetches everything one source exposes and normalizes it into
//! [`RawGroups`]: group label -> entity ID -> raw metrics.

mod ksm;
mod kubelet;
mod quantity;
mod summary;


pub use ksm::KsmGrouper;
pub(crate) use ksm::group_by_labels;
pub use kubelet::KubeletGrouper;
pub use quantity::parse_quantity;

use crate::client::{ClientError, KubeError};
use crate::definition::SpecGroups;
use crate::discovery::Source;
use crate::models::RawGroups;
use crate::prometheus::PrometheusError;
use async_trait::async_trait;
use thiserror::Error;

/// Grouping failures
///
/// Returned from [`Grouper::group`] they fail the whole grouper; inside a
/// [`GroupOutcome`] they are recoverable and only some data is missing.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Prometheus(#[from] PrometheusError),

    #[error("failed to read labels of node {node}: {source}")]
    NodeLabels {
        node: String,
        #[source]
        source: KubeError,
    },

    #[error("no data was fetched from {0}")]
    NoData(Source),
}

/// Raw groups plus the recoverable errors met while building them
#[derive(Debug, Default)]
pub struct GroupOutcome {
    pub groups: RawGroups,
    pub errors: Vec<GroupError>,
}

#[async_trait]
pub trait Grouper: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch and normalize one snapshot of the source
    async fn group(&self, specs: &SpecGroups) -> Result<GroupOutcome, GroupError>;
}

//! Structured JSON events for a collection pass

use crate::discovery::Source;
use crate::models::Role;
use std::time::Duration;
use tracing::{info, warn};

/// Structured logger for agent events
///
/// Every event carries an `event` field so the JSON output can be filtered
/// by event name.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, cluster_name: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            cluster = %cluster_name,
            "Telemetry agent started"
        );
    }

    /// Log a located source
    pub fn log_discovery(&self, source: Source, url: &str, node_ip: &str) {
        info!(
            event = "source_discovered",
            node = %self.node_name,
            source = %source,
            url = %url,
            node_ip = %node_ip,
            "Metrics source located"
        );
    }

    pub fn log_discovery_failed(&self, source: Source, error: &str) {
        warn!(
            event = "source_discovery_failed",
            node = %self.node_name,
            source = %source,
            error = %error,
            "Failed to locate metrics source"
        );
    }

    /// Log the role this node takes for the pass
    pub fn log_role(&self, role: Role, kubelet_node_ip: &str, ksm_node_ip: Option<&str>) {
        info!(
            event = "role_resolved",
            node = %self.node_name,
            role = %role,
            kubelet_node_ip = %kubelet_node_ip,
            ksm_node_ip = ?ksm_node_ip,
            "Resolved node role"
        );
    }

    /// Log the population result of one source
    pub fn log_source_populated(&self, source: Source, populated: bool, errors: usize) {
        if populated {
            info!(
                event = "source_populated",
                node = %self.node_name,
                source = %source,
                errors = errors,
                "Populated metrics from source"
            );
        } else {
            warn!(
                event = "source_empty",
                node = %self.node_name,
                source = %source,
                errors = errors,
                "No metrics populated from source"
            );
        }
    }

    pub fn log_source_failed(&self, source: Source, error: &str) {
        warn!(
            event = "source_failed",
            node = %self.node_name,
            source = %source,
            error = %error,
            "Failed to collect metrics from source"
        );
    }

    /// Log the end of a pass
    pub fn log_pass_complete(&self, role: Role, entities: usize, elapsed: Duration) {
        info!(
            event = "pass_completed",
            node = %self.node_name,
            role = %role,
            entities = entities,
            elapsed_ms = elapsed.as_millis() as u64,
            "Collection pass completed"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Telemetry agent shutting down"
        );
    }
}

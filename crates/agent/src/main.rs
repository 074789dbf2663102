//! kube-telemetry - per-node Kubernetes telemetry collector
//!
//! Runs as a DaemonSet on each node. Every invocation performs one
//! collection pass and writes the result as JSON to stdout.

use anyhow::Result;
use std::sync::Arc;
use telemetry_lib::client::KubeClient;
use telemetry_lib::{CollectionPassBuilder, StructuredLogger};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod publish;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the payload, logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::AgentConfig::load()?;
    info!(node_name = %config.node_name, cluster = %config.cluster_name, "Agent configured");

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, &config.cluster_name);

    let kube = KubeClient::try_default().await?;
    let pass = CollectionPassBuilder::new()
        .kube(Arc::new(kube))
        .config(config.pass_config())
        .build()?;

    let report = pass.run().await?;
    publish::Payload::new(AGENT_VERSION, &report.store).write_to(std::io::stdout().lock())?;

    logger.log_shutdown("pass completed");
    Ok(())
}

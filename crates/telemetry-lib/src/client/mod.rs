//! Orchestrator capability client and the HTTP client handed to groupers

mod http;

pub use http::{ClientError, SourceClient};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{Api, ListParams};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// In-cluster service account mount
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Errors from the capability client
#[derive(Debug, Error)]
pub enum KubeError {
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to read service account file {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account token")]
    InvalidToken,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to build secure HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// The narrow set of orchestrator operations discovery needs
#[async_trait]
pub trait Kubernetes: Send + Sync {
    /// Node object by name
    async fn find_node(&self, name: &str) -> Result<Node, KubeError>;

    /// Pods in all namespaces carrying the label `name=value`
    async fn find_pods_by_label(&self, name: &str, value: &str) -> Result<Vec<Pod>, KubeError>;

    /// Services in all namespaces carrying the label `name=value`
    async fn find_services_by_label(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<Service>, KubeError>;

    /// HTTP client that trusts the cluster CA and sends the service account token
    fn secure_http_client(&self, timeout: Duration) -> Result<reqwest::Client, KubeError>;
}

/// `Kubernetes` backed by the API server
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
    service_account_dir: PathBuf,
}

impl KubeClient {
    /// Client from the in-cluster (or kubeconfig) environment
    pub async fn try_default() -> Result<Self, KubeError> {
        let client = kube::Client::try_default().await?;
        Ok(Self::new(client))
    }

    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            service_account_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
        }
    }

    /// Read credentials from another directory instead of the standard mount
    pub fn with_service_account_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.service_account_dir = dir.into();
        self
    }
}

#[async_trait]
impl Kubernetes for KubeClient {
    async fn find_node(&self, name: &str) -> Result<Node, KubeError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes
            .get_opt(name)
            .await?
            .ok_or_else(|| KubeError::NotFound(format!("node {}", name)))
    }

    async fn find_pods_by_label(&self, name: &str, value: &str) -> Result<Vec<Pod>, KubeError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&format!("{}={}", name, value));
        Ok(pods.list(&params).await?.items)
    }

    async fn find_services_by_label(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<Service>, KubeError> {
        let services: Api<Service> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&format!("{}={}", name, value));
        Ok(services.list(&params).await?.items)
    }

    fn secure_http_client(&self, timeout: Duration) -> Result<reqwest::Client, KubeError> {
        service_account_http_client(&self.service_account_dir, timeout)
    }
}

fn read_credential(dir: &Path, file: &str) -> Result<Vec<u8>, KubeError> {
    let path = dir.join(file);
    std::fs::read(&path).map_err(|source| KubeError::Credentials { path, source })
}

/// reqwest client trusting `ca.crt` and authenticating with `token` from `dir`
pub fn service_account_http_client(
    dir: &Path,
    timeout: Duration,
) -> Result<reqwest::Client, KubeError> {
    let ca = read_credential(dir, "ca.crt")?;
    let token = read_credential(dir, "token")?;

    let token = String::from_utf8(token).map_err(|_| KubeError::InvalidToken)?;
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
        .map_err(|_| KubeError::InvalidToken)?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);

    debug!(dir = %dir.display(), "Building service account HTTP client");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
        .default_headers(headers)
        .build()?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_credentials_are_reported() {
        let dir = TempDir::new().unwrap();
        let err = service_account_http_client(dir.path(), Duration::from_secs(1)).unwrap_err();
        match err {
            KubeError::Credentials { path, .. } => assert!(path.ends_with("ca.crt")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ca.crt"), b"not a pem").unwrap();
        std::fs::write(dir.path().join("token"), b"bad\ntoken\n\x7f").unwrap();

        let err = service_account_http_client(dir.path(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, KubeError::InvalidToken));
    }
}

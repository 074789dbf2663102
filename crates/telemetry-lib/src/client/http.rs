use super::{KubeError, Kubernetes};
use crate::discovery::{DiscoveredEndpoint, EndpointAuth};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;
use url::Url;

/// Errors talking to a metrics source
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error(transparent)]
    Kube(#[from] KubeError),

    #[error("invalid request path {path}: {source}")]
    Path {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned {status}")]
    Status { url: Url, status: StatusCode },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// HTTP client bound to one discovered source
#[derive(Debug, Clone)]
pub struct SourceClient {
    endpoint: DiscoveredEndpoint,
    http: Client,
}

impl SourceClient {
    /// Build the client an endpoint asks for
    pub fn connect(
        endpoint: DiscoveredEndpoint,
        timeout: Duration,
        kube: &dyn Kubernetes,
    ) -> Result<Self, ClientError> {
        let http = match endpoint.auth {
            EndpointAuth::None => Client::builder()
                .timeout(timeout)
                .build()
                .map_err(ClientError::Build)?,
            EndpointAuth::ServiceAccount => kube.secure_http_client(timeout)?,
        };

        Ok(Self { endpoint, http })
    }

    /// Unauthenticated client, regardless of what the endpoint asks for
    pub fn plain(endpoint: DiscoveredEndpoint, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &DiscoveredEndpoint {
        &self.endpoint
    }

    /// Node affinity of the source
    pub fn node_ip(&self) -> &str {
        &self.endpoint.node_ip
    }

    pub fn url(&self) -> &Url {
        &self.endpoint.url
    }

    /// Resolve `path` below the endpoint URL, keeping any base path prefix
    fn request_url(&self, path: &str) -> Result<Url, ClientError> {
        let mut base = self.endpoint.url.clone();
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }

        base.join(path.trim_start_matches('/'))
            .map_err(|source| ClientError::Path {
                path: path.to_string(),
                source,
            })
    }

    async fn get(&self, path: &str) -> Result<(Url, reqwest::Response), ClientError> {
        let url = self.request_url(path)?;

        trace!(url = %url, "GET");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                url,
                status: response.status(),
            });
        }

        Ok((url, response))
    }

    /// GET `path` and return the body as text
    pub async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let (url, response) = self.get(path).await?;
        response
            .text()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let (url, response) = self.get(path).await?;
        response
            .json()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> SourceClient {
        let endpoint = DiscoveredEndpoint {
            url: Url::parse(url).unwrap(),
            node_ip: "10.0.0.1".to_string(),
            auth: EndpointAuth::None,
        };
        SourceClient::plain(endpoint, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_request_url_keeps_base_path() {
        let with_slash = client("http://proxy:8001/svc/ksm/proxy/");
        let without_slash = client("http://proxy:8001/svc/ksm/proxy");

        for c in [&with_slash, &without_slash] {
            assert_eq!(
                c.request_url("/metrics").unwrap().as_str(),
                "http://proxy:8001/svc/ksm/proxy/metrics"
            );
        }
    }

    #[test]
    fn test_request_url_at_root() {
        let c = client("https://10.0.0.1:10250/");
        assert_eq!(
            c.request_url("/stats/summary").unwrap().as_str(),
            "https://10.0.0.1:10250/stats/summary"
        );
        assert_eq!(
            c.request_url("pods").unwrap().as_str(),
            "https://10.0.0.1:10250/pods"
        );
    }

    #[tokio::test]
    async fn test_get_text_under_path_prefix() {
        let mut server = mockito::Server::new_async().await;
        let _metrics = server
            .mock("GET", "/ksm/metrics")
            .with_status(200)
            .with_body("kube_namespace_created{namespace=\"default\"} 1\n")
            .create_async()
            .await;

        let body = client(&format!("{}/ksm", server.url()))
            .get_text("/metrics")
            .await
            .unwrap();
        assert!(body.starts_with("kube_namespace_created"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _pods = server
            .mock("GET", "/pods")
            .with_status(403)
            .create_async()
            .await;

        let err = client(&server.url()).get_text("/pods").await.unwrap_err();
        match err {
            ClientError::Status { url, status } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(url.as_str().ends_with("/pods"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}

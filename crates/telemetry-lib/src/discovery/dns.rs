use super::DiscoveryError;
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;

/// One SRV answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub target: String,
    pub port: u16,
}

/// SRV lookups, abstracted so discovery can run without a cluster DNS
#[async_trait]
pub trait SrvResolver: Send + Sync {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DiscoveryError>;
}

/// Resolver configured from the host's resolv.conf
///
/// The underlying resolver is built per lookup so a node without a usable
/// resolver configuration still falls through to the API strategy.
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

#[async_trait]
impl SrvResolver for SystemResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DiscoveryError> {
        let resolver =
            TokioAsyncResolver::tokio_from_system_conf().map_err(|e| DiscoveryError::Dns {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let lookup = resolver
            .srv_lookup(name)
            .await
            .map_err(|e| DiscoveryError::Dns {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                target: srv.target().to_utf8(),
                port: srv.port(),
            })
            .collect())
    }
}

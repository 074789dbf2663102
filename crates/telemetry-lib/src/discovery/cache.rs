//! Disk-backed discovery cache
//!
//! One JSON file per source, named by the hex SHA-256 of the source identity.
//! Entries older than the TTL are treated as absent.

use super::{DiscoveredEndpoint, Discoverer, DiscoveryError, Source};
use crate::client::{Kubernetes, SourceClient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors persisting a cache entry
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache entry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    endpoint: DiscoveredEndpoint,
    written_at: DateTime<Utc>,
}

/// Discovery results persisted across invocations
#[derive(Debug, Clone)]
pub struct DiscoveryStore {
    dir: PathBuf,
    ttl: Duration,
}

impl DiscoveryStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key of a source
    pub fn key(source: Source) -> String {
        hex::encode(Sha256::digest(source.as_str().as_bytes()))
    }

    fn path(&self, source: Source) -> PathBuf {
        self.dir.join(Self::key(source))
    }

    /// Live entry for `source`, if any
    pub fn read(&self, source: Source) -> Option<DiscoveredEndpoint> {
        self.read_at(source, Utc::now())
    }

    /// Live entry for `source` as seen at `now`
    ///
    /// Missing, unreadable, corrupt and expired entries are all misses.
    pub fn read_at(&self, source: Source, now: DateTime<Utc>) -> Option<DiscoveredEndpoint> {
        let path = self.path(source);

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                debug!(source = %source, path = %path.display(), error = %e, "Discovery cache miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(source = %source, path = %path.display(), error = %e, "Ignoring corrupt discovery cache entry");
                return None;
            }
        };

        if self.is_expired(entry.written_at, now) {
            debug!(source = %source, written_at = %entry.written_at, "Discovery cache entry expired");
            return None;
        }

        Some(entry.endpoint)
    }

    fn is_expired(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(written_at).to_std() {
            Ok(age) => age > self.ttl,
            // written in the future
            Err(_) => false,
        }
    }

    /// Persist `endpoint` for `source`, stamped now
    pub fn write(&self, source: Source, endpoint: &DiscoveredEndpoint) -> Result<(), CacheError> {
        self.write_at(source, endpoint, Utc::now())
    }

    /// Persist `endpoint` for `source` with an explicit timestamp
    pub fn write_at(
        &self,
        source: Source,
        endpoint: &DiscoveredEndpoint,
        written_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let entry = CacheEntry {
            endpoint: endpoint.clone(),
            written_at,
        };
        let json = serde_json::to_vec(&entry)?;

        let path = self.path(source);
        let temp_path = self
            .dir
            .join(format!("{}.{}.tmp", Self::key(source), std::process::id()));

        let write = |p: &Path| -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(p)?;
            file.write_all(&json)?;
            file.sync_all()
        };

        write(&temp_path).map_err(|source| CacheError::Write {
            path: temp_path.clone(),
            source,
        })?;

        std::fs::rename(&temp_path, &path).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
        })?;

        debug!(source = %source, path = %path.display(), "Discovery cache entry written");
        Ok(())
    }
}

/// A discoverer behind the disk cache
pub struct CachedDiscoverer<D> {
    inner: D,
    store: DiscoveryStore,
    kube: Arc<dyn Kubernetes>,
}

impl<D: Discoverer> CachedDiscoverer<D> {
    pub fn new(inner: D, store: DiscoveryStore, kube: Arc<dyn Kubernetes>) -> Self {
        Self { inner, store, kube }
    }

    pub fn source(&self) -> Source {
        self.inner.source()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Client for the source, from the cache when a live entry exists
    ///
    /// A configured override bypasses the cache in both directions.
    pub async fn discover(&self, timeout: Duration) -> Result<SourceClient, DiscoveryError> {
        let source = self.inner.source();

        if self.inner.has_override() {
            let endpoint = self.inner.discover(timeout).await?;
            debug!(source = %source, url = %endpoint.url, "Using endpoint override");
            return Ok(SourceClient::connect(endpoint, timeout, self.kube.as_ref())?);
        }

        if let Some(endpoint) = self.store.read(source) {
            debug!(source = %source, url = %endpoint.url, "Using cached endpoint");
            return Ok(SourceClient::connect(endpoint, timeout, self.kube.as_ref())?);
        }

        let endpoint = self.inner.discover(timeout).await?;
        info!(source = %source, url = %endpoint.url, node_ip = %endpoint.node_ip, "Discovered endpoint");

        if let Err(e) = self.store.write(source, &endpoint) {
            warn!(source = %source, error = %e, "Failed to cache discovered endpoint");
        }

        Ok(SourceClient::connect(endpoint, timeout, self.kube.as_ref())?)
    }
}

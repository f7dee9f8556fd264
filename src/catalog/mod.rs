//! Version catalog: version identifier -> download URL.
//!
//! The catalog is an external collaborator; the manager only depends on
//! the [`VersionCatalog`] trait. [`RemoteCatalog`] populates itself once
//! from a JSON manifest at startup — a failed fetch yields an empty
//! catalog rather than blocking, and every resolution then fails with
//! `NotFound` until [`RemoteCatalog::repopulate`] succeeds.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resolves version identifiers to artifact download URLs.
#[async_trait]
pub trait VersionCatalog: Send + Sync {
    /// All version identifiers currently known to the catalog.
    async fn versions(&self) -> Vec<String>;

    /// Resolve a version identifier to its download URL.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the version is unknown.
    async fn resolve(&self, version: &str) -> Result<String>;
}

/// Fixed in-memory catalog, used in tests and for pinned deployments.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    versions: HashMap<String, String>,
}

impl StaticCatalog {
    pub fn new(versions: HashMap<String, String>) -> Self {
        Self { versions }
    }

    pub fn insert(&mut self, version: impl Into<String>, url: impl Into<String>) {
        self.versions.insert(version.into(), url.into());
    }
}

impl FromIterator<(String, String)> for StaticCatalog {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl VersionCatalog for StaticCatalog {
    async fn versions(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    async fn resolve(&self, version: &str) -> Result<String> {
        self.versions
            .get(version)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Version '{}'", version)))
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    versions: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    url: String,
}

/// Catalog populated from a remote JSON manifest.
pub struct RemoteCatalog {
    manifest_url: String,
    versions: RwLock<HashMap<String, String>>,
}

impl RemoteCatalog {
    /// Fetch the manifest and build the catalog. A failed fetch logs a
    /// warning and yields an empty catalog; startup is never blocked on
    /// the manifest host.
    pub async fn populate(manifest_url: impl Into<String>) -> Self {
        let catalog = Self {
            manifest_url: manifest_url.into(),
            versions: RwLock::new(HashMap::new()),
        };
        if let Err(e) = catalog.repopulate().await {
            tracing::warn!(
                manifest = %catalog.manifest_url,
                error = %e,
                "Catalog fetch failed, starting with an empty catalog"
            );
        }
        catalog
    }

    /// Re-fetch the manifest, replacing the current mapping on success.
    pub async fn repopulate(&self) -> Result<()> {
        let manifest: Manifest = reqwest::Client::new()
            .get(&self.manifest_url)
            .header(
                reqwest::header::USER_AGENT,
                crate::server::install::USER_AGENT,
            )
            .send()
            .await
            .map_err(|e| Error::Catalog(format!("Manifest request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Catalog(format!("Manifest fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Catalog(format!("Malformed manifest: {}", e)))?;

        let mapping: HashMap<String, String> = manifest
            .versions
            .into_iter()
            .map(|entry| (entry.id, entry.url))
            .collect();

        tracing::info!(count = mapping.len(), "Version catalog populated");
        *self.versions.write().await = mapping;
        Ok(())
    }
}

#[async_trait]
impl VersionCatalog for RemoteCatalog {
    async fn versions(&self) -> Vec<String> {
        self.versions.read().await.keys().cloned().collect()
    }

    async fn resolve(&self, version: &str) -> Result<String> {
        self.versions
            .read()
            .await
            .get(version)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Version '{}'", version)))
    }
}

//! Artifact manager coordinating resolution, caching, download and install.
//!
//! The `ArtifactManager` is the main entry point of the artifacts subsystem.
//! It owns one HTTP client shared by discovery and transfers, and serializes
//! concurrent acquisitions of the same cache slot so that only the first one
//! touches the network.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use super::downloader::Downloader;
use super::error::{ArtifactError, Result};
use super::oci::OciClient;
use super::paths::CachePaths;
use super::resolver::{ArtifactLocator, Discovery, LocatorRegistry, SourceResolver};
use super::types::{ArtifactType, CacheKey, DownloadOptions, Source};
use crate::config::ArtifactSettings;

// ============================================================================
// Requests
// ============================================================================

/// What to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub name: String,
    /// Concrete version, or empty / `"latest"` to discover the newest one.
    pub version: String,
    pub kind: ArtifactType,
    /// Use the regional mirror instead of the public upstreams.
    pub from_region: bool,
}

impl ArtifactRequest {
    pub fn new(kind: ArtifactType, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind,
            from_region: false,
        }
    }

    pub fn from_region(mut self, from_region: bool) -> Self {
        self.from_region = from_region;
        self
    }
}

/// How to acquire it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Reuse an already downloaded package when present.
    pub enable_cache: bool,
    /// Upper bound on the whole acquisition.
    pub deadline: Option<Duration>,
}

/// Result of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredArtifact {
    /// The pinned source that was fetched.
    pub source: Source,
    /// Package path for charts, installed executable path for binaries.
    pub path: PathBuf,
}

// ============================================================================
// Keyed Locks
// ============================================================================

/// One async mutex per cache key, created on demand.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn handle(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries only referenced by the map are idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.clone()).or_default().clone()
    }
}

// ============================================================================
// Artifact Manager
// ============================================================================

/// Acquires charts and binaries into the local cache.
///
/// Thread-safe; share it behind an `Arc` across tasks.
#[derive(Debug)]
pub struct ArtifactManager {
    settings: ArtifactSettings,
    resolver: SourceResolver,
    paths: CachePaths,
    downloader: Downloader,
    locks: KeyedLocks,
}

impl ArtifactManager {
    /// Creates a manager with the built-in locators registered.
    pub fn new(settings: ArtifactSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("shipyard/{}", crate::VERSION))
            .build()
            .map_err(|e| ArtifactError::InvalidArgument(format!("failed to build HTTP client: {}", e)))?;

        let discovery = Discovery::new(
            client.clone(),
            settings.endpoints.clone(),
            settings.github_token.clone(),
        );
        let resolver =
            SourceResolver::new(discovery, LocatorRegistry::with_defaults(), settings.platform);
        let oci = OciClient::new(client.clone(), settings.oci.plain_http);
        let downloader = Downloader::new(client, oci, settings.platform);
        let paths = CachePaths::new(&settings.cache_root);

        debug!(
            "Artifact manager initialised (cache: {}, platform: {:?})",
            settings.cache_root.display(),
            settings.platform
        );

        Ok(Self {
            settings,
            resolver,
            paths,
            downloader,
            locks: KeyedLocks::default(),
        })
    }

    pub fn settings(&self) -> &ArtifactSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Adds or replaces a locator.
    pub fn register_locator<L: ArtifactLocator + 'static>(&mut self, locator: L) {
        self.resolver.registry_mut().register(locator);
    }

    /// Resolves, downloads and (for binaries) installs one artifact.
    ///
    /// Concurrent calls for the same `(type, name, version)` run one after the
    /// other; with caching enabled the later ones find the package on disk.
    pub async fn acquire(
        &self,
        request: &ArtifactRequest,
        options: &AcquireOptions,
    ) -> Result<AcquiredArtifact> {
        let acquisition = self.acquire_inner(request, options.enable_cache);
        match options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, acquisition)
                .await
                .map_err(|_| ArtifactError::Cancelled {
                    name: request.name.clone(),
                    deadline,
                })?,
            None => acquisition.await,
        }
    }

    async fn acquire_inner(
        &self,
        request: &ArtifactRequest,
        enable_cache: bool,
    ) -> Result<AcquiredArtifact> {
        let source = self
            .resolver
            .resolve(&request.name, &request.version, request.kind, request.from_region)
            .await?;

        let package_dir = self
            .paths
            .allocate(source.kind, &source.name, &source.version, false)?;
        let binary_install_dir = match source.kind {
            ArtifactType::Binary => Some(self.paths.allocate(
                source.kind,
                &source.name,
                &source.version,
                true,
            )?),
            ArtifactType::Chart => None,
        };

        let key = source.cache_key();
        let lock = self.locks.handle(&key);
        let _guard = lock.lock().await;
        debug!("Holding cache slot {}", key);

        let options = DownloadOptions {
            enable_cache,
            binary_install_dir,
            deadline: None,
        };
        let path = self.downloader.fetch(&source, &package_dir, &options).await?;

        info!("Acquired {} at {}", key, path.display());
        Ok(AcquiredArtifact { source, path })
    }
}

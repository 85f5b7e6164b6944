//! Source resolution: turning a logical request into a pinned [`Source`].
//!
//! Each distributable component is described by an [`ArtifactLocator`] that
//! knows how to find its newest version and where a pinned version is
//! downloaded from. Locators live in a [`LocatorRegistry`] keyed by kind and
//! name, so adding a component never touches [`SourceResolver`].
//!
//! Charts without a registered locator fall back to [`ReleaseChartLocator`].

mod binaries;
mod charts;
pub mod discovery;

pub use binaries::{HelmBinaryLocator, ShipyardBinaryLocator};
pub use charts::{OciChartLocator, ReleaseChartLocator};
pub use discovery::{ChartIndex, ChartVersion, Discovery};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::error::{ArtifactError, Result};
use super::types::{is_latest, ArtifactType, Platform, Source};

// ============================================================================
// Locator Seam
// ============================================================================

/// Per-call inputs shared by every locator.
#[derive(Debug, Clone, Copy)]
pub struct LocateContext<'a> {
    pub discovery: &'a Discovery,
    pub platform: Option<Platform>,
}

impl LocateContext<'_> {
    /// Returns the target platform, or `UnsupportedPlatform` for `name`.
    pub fn require_platform(&self, name: &str) -> Result<Platform> {
        self.platform
            .ok_or_else(|| ArtifactError::UnsupportedPlatform {
                name: name.to_string(),
                platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            })
    }
}

/// Download location of one pinned artifact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file_name: String,
    pub url: String,
}

/// Knows where one distributable component is published.
#[async_trait]
pub trait ArtifactLocator: Send + Sync {
    /// Logical component name.
    fn name(&self) -> &str;

    /// Kind of artifact this locator produces.
    fn kind(&self) -> ArtifactType;

    /// Name used for this component on the regional mirror.
    fn mirror_name(&self) -> &str {
        self.name()
    }

    /// Finds the newest version through the public upstream.
    async fn discover_latest(&self, ctx: &LocateContext<'_>) -> Result<String>;

    /// Computes file name and URL for a pinned version.
    fn locate(&self, version: &str, from_region: bool, ctx: &LocateContext<'_>) -> Result<Location>;
}

// ============================================================================
// Registry
// ============================================================================

/// Name-keyed table of locators.
#[derive(Clone, Default)]
pub struct LocatorRegistry {
    locators: HashMap<(ArtifactType, String), Arc<dyn ArtifactLocator>>,
}

impl LocatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with Shipyard's built-in components.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ShipyardBinaryLocator::new());
        registry.register(HelmBinaryLocator::new());
        registry.register(OciChartLocator::new(
            "postgres-operator",
            "oci://ghcr.io/shipyard-io/charts",
        ));
        registry
    }

    /// Adds or replaces the locator for its `(kind, name)`.
    pub fn register<L: ArtifactLocator + 'static>(&mut self, locator: L) {
        let key = (locator.kind(), locator.name().to_string());
        self.locators.insert(key, Arc::new(locator));
    }

    /// Returns the locator for `(kind, name)`.
    ///
    /// Unregistered charts get a [`ReleaseChartLocator`]; unregistered
    /// binaries are `NotFound`.
    pub fn lookup(&self, kind: ArtifactType, name: &str) -> Result<Arc<dyn ArtifactLocator>> {
        if let Some(locator) = self.locators.get(&(kind, name.to_string())) {
            return Ok(Arc::clone(locator));
        }

        match kind {
            ArtifactType::Chart => Ok(Arc::new(ReleaseChartLocator::new(name))),
            ArtifactType::Binary => Err(ArtifactError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                detail: "no locator registered".to_string(),
            }),
        }
    }

    /// Returns the names registered for `kind`, sorted.
    pub fn names(&self, kind: ArtifactType) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .locators
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for LocatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocatorRegistry")
            .field("charts", &self.names(ArtifactType::Chart))
            .field("binaries", &self.names(ArtifactType::Binary))
            .finish()
    }
}

// ============================================================================
// Source Resolver
// ============================================================================

/// Resolves logical artifact requests into pinned [`Source`]s.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    discovery: Discovery,
    registry: LocatorRegistry,
    platform: Option<Platform>,
}

impl SourceResolver {
    pub fn new(discovery: Discovery, registry: LocatorRegistry, platform: Option<Platform>) -> Self {
        Self {
            discovery,
            registry,
            platform,
        }
    }

    pub fn registry(&self) -> &LocatorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut LocatorRegistry {
        &mut self.registry
    }

    /// Resolves `name` at `version` into a pinned source.
    ///
    /// An empty version or `"latest"` triggers version discovery: the regional
    /// pointer file when `from_region` is set, otherwise the component's public
    /// upstream. Any other version is used unchanged.
    pub async fn resolve(
        &self,
        name: &str,
        version: &str,
        kind: ArtifactType,
        from_region: bool,
    ) -> Result<Source> {
        if name.trim().is_empty() {
            return Err(ArtifactError::InvalidArgument(
                "artifact name must not be empty".to_string(),
            ));
        }

        let locator = self.registry.lookup(kind, name)?;
        let ctx = LocateContext {
            discovery: &self.discovery,
            platform: self.platform,
        };

        let version = if is_latest(version) {
            if from_region {
                self.discovery
                    .fetch_regional_latest(kind, locator.mirror_name())
                    .await?
            } else {
                locator.discover_latest(&ctx).await?
            }
        } else {
            version.to_string()
        };

        let location = locator.locate(&version, from_region, &ctx)?;
        debug!("Resolved {} {} {} -> {}", kind, name, version, location.url);

        Ok(Source {
            name: name.to_string(),
            version,
            kind,
            file_name: location.file_name,
            url: location.url,
            from_region,
        })
    }
}

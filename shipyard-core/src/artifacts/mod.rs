//! Artifact acquisition for charts and binaries.
//!
//! Turns a logical request such as "chart `shipyard`, latest" into a file on
//! disk. Versions are discovered from upstream indexes or the regional
//! mirror, packages are cached under a deterministic directory layout, and
//! binary packages are unpacked so their executables land in an install
//! directory.
//!
//! # Architecture
//!
//! - `types`: Core types (ArtifactType, Source, CacheKey, Platform)
//! - `error`: The shared `ArtifactError`
//! - `version`: Semantic version comparison
//! - `paths`: Cache directory allocation
//! - `resolver`: Locators, version discovery and the chart index
//! - `oci`: Chart pulls from OCI registries
//! - `downloader`: Cached, streaming downloads
//! - `extractor`: Archive extraction (zip, tar.gz)
//! - `installer`: Moving executables out of binary packages
//! - `manager`: High-level API tying the above together
//!
//! # Example
//!
//! ```ignore
//! use shipyard_core::artifacts::{AcquireOptions, ArtifactManager, ArtifactRequest, ArtifactType};
//! use shipyard_core::config::ArtifactSettings;
//!
//! let manager = ArtifactManager::new(ArtifactSettings::default().with_env_overrides())?;
//!
//! let request = ArtifactRequest::new(ArtifactType::Binary, "helm", "latest");
//! let options = AcquireOptions { enable_cache: true, deadline: None };
//! let helm = manager.acquire(&request, &options).await?;
//! println!("helm installed at: {}", helm.path.display());
//! ```

pub mod downloader;
pub mod error;
pub mod extractor;
pub mod installer;
pub mod manager;
pub mod oci;
pub mod paths;
pub mod resolver;
pub mod types;
pub mod version;

// Re-export commonly used types
pub use downloader::Downloader;
pub use error::{ArtifactError, Result};
pub use extractor::{extract, ArchiveFormat};
pub use installer::install;
pub use manager::{AcquireOptions, AcquiredArtifact, ArtifactManager, ArtifactRequest};
pub use oci::{OciClient, OciReference};
pub use paths::CachePaths;
pub use resolver::{
    ArtifactLocator, ChartIndex, ChartVersion, Discovery, HelmBinaryLocator, LocateContext,
    Location, LocatorRegistry, OciChartLocator, ReleaseChartLocator, ShipyardBinaryLocator,
    SourceResolver,
};
pub use types::{
    is_latest, Arch, ArtifactType, CacheKey, DownloadOptions, Os, Platform, Source, LATEST,
};
pub use version::{is_greater, parse_version};

//! Locators for executable packages.

use async_trait::async_trait;
use tracing::debug;

use super::{ArtifactLocator, LocateContext, Location};
use crate::artifacts::error::{ArtifactError, Result};
use crate::artifacts::types::{ArtifactType, Os};
use crate::artifacts::version;
use crate::config::Endpoints;

fn regional_url(endpoints: &Endpoints, mirror_name: &str, version: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        endpoints.region_base.trim_end_matches('/'),
        ArtifactType::Binary.cache_segment(),
        mirror_name,
        version,
        file_name
    )
}

// ============================================================================
// Shipyard CLI
// ============================================================================

/// Releases after this one embed the version in the package file name.
pub const SHIPYARD_NAMING_THRESHOLD: &str = "0.4.0-nightly-20230802";

/// The project's own command-line binary.
///
/// - legacy (`<=` threshold): `shipyard-{os}-{arch}.tar.gz`
/// - current: `shipyard-{version}-{os}-{arch}.tar.gz`
#[derive(Debug, Clone)]
pub struct ShipyardBinaryLocator {
    owner: String,
    repo: String,
}

impl ShipyardBinaryLocator {
    pub fn new() -> Self {
        Self {
            owner: "shipyard-io".to_string(),
            repo: "shipyard".to_string(),
        }
    }

    fn file_name(&self, version: &str, os: &str, arch: &str) -> Result<String> {
        if version::is_greater(version, SHIPYARD_NAMING_THRESHOLD)? {
            Ok(format!("{}-{}-{}-{}.tar.gz", self.repo, version, os, arch))
        } else {
            debug!("{} uses the legacy package name", version);
            Ok(format!("{}-{}-{}.tar.gz", self.repo, os, arch))
        }
    }
}

impl Default for ShipyardBinaryLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactLocator for ShipyardBinaryLocator {
    fn name(&self) -> &str {
        "shipyard"
    }

    fn kind(&self) -> ArtifactType {
        ArtifactType::Binary
    }

    fn mirror_name(&self) -> &str {
        "shipyard-cli"
    }

    async fn discover_latest(&self, ctx: &LocateContext<'_>) -> Result<String> {
        ctx.discovery
            .fetch_latest_release(&self.owner, &self.repo)
            .await
    }

    fn locate(&self, version: &str, from_region: bool, ctx: &LocateContext<'_>) -> Result<Location> {
        let platform = ctx.require_platform(self.name())?;
        let file_name = self.file_name(version, platform.os.as_str(), platform.arch.as_str())?;
        let endpoints = ctx.discovery.endpoints();

        let url = if from_region {
            regional_url(endpoints, self.mirror_name(), version, &file_name)
        } else {
            format!(
                "{}/{}/{}/releases/download/{}/{}",
                endpoints.release_download_base.trim_end_matches('/'),
                self.owner,
                self.repo,
                version,
                file_name
            )
        };

        Ok(Location { file_name, url })
    }
}

// ============================================================================
// Helm
// ============================================================================

/// Version used when helm is requested as latest without the regional mirror.
pub const HELM_REFERENCE_VERSION: &str = "v3.14.2";

/// The helm CLI, which never floats to a newer upstream release.
///
/// File: `helm-{version}-{os}-{arch}.{tar.gz|zip}`
#[derive(Debug, Clone, Default)]
pub struct HelmBinaryLocator;

impl HelmBinaryLocator {
    pub fn new() -> Self {
        Self
    }

    /// Package extension per OS.
    ///
    /// Only linux and windows packages are mirrored for helm. Darwin has no
    /// mirrored package, so resolving it reports `UnsupportedPlatform` instead
    /// of producing a URL that would 404.
    fn extension(os: Os) -> Option<&'static str> {
        match os {
            Os::Linux => Some("tar.gz"),
            Os::Windows => Some("zip"),
            Os::Darwin => None,
        }
    }
}

#[async_trait]
impl ArtifactLocator for HelmBinaryLocator {
    fn name(&self) -> &str {
        "helm"
    }

    fn kind(&self) -> ArtifactType {
        ArtifactType::Binary
    }

    async fn discover_latest(&self, _ctx: &LocateContext<'_>) -> Result<String> {
        Ok(HELM_REFERENCE_VERSION.to_string())
    }

    fn locate(&self, version: &str, from_region: bool, ctx: &LocateContext<'_>) -> Result<Location> {
        let platform = ctx.require_platform(self.name())?;
        let extension =
            Self::extension(platform.os).ok_or_else(|| ArtifactError::UnsupportedPlatform {
                name: self.name().to_string(),
                platform: platform.to_string(),
            })?;

        let file_name = format!(
            "helm-{}-{}-{}.{}",
            version,
            platform.os.as_str(),
            platform.arch.as_str(),
            extension
        );
        let endpoints = ctx.discovery.endpoints();

        let url = if from_region {
            regional_url(endpoints, self.mirror_name(), version, &file_name)
        } else {
            format!(
                "{}/{}",
                endpoints.helm_download_base.trim_end_matches('/'),
                file_name
            )
        };

        Ok(Location { file_name, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::resolver::Discovery;
    use crate::artifacts::types::{Arch, Platform};

    fn discovery() -> Discovery {
        Discovery::new(reqwest::Client::new(), Endpoints::default(), None)
    }

    fn ctx(discovery: &Discovery, os: Os, arch: Arch) -> LocateContext<'_> {
        LocateContext {
            discovery,
            platform: Some(Platform::new(os, arch)),
        }
    }

    #[test]
    fn test_shipyard_naming_threshold() {
        let discovery = discovery();
        let ctx = ctx(&discovery, Os::Darwin, Arch::Arm64);
        let locator = ShipyardBinaryLocator::new();

        let current = locator.locate("v0.4.0-nightly-20230807", false, &ctx).unwrap();
        assert_eq!(
            current.file_name,
            "shipyard-v0.4.0-nightly-20230807-darwin-arm64.tar.gz"
        );
        assert_eq!(
            current.url,
            "https://github.com/shipyard-io/shipyard/releases/download/v0.4.0-nightly-20230807/shipyard-v0.4.0-nightly-20230807-darwin-arm64.tar.gz"
        );

        let at_threshold = locator.locate("v0.4.0-nightly-20230802", false, &ctx).unwrap();
        assert_eq!(at_threshold.file_name, "shipyard-darwin-arm64.tar.gz");

        let legacy = locator.locate("v0.3.2", true, &ctx).unwrap();
        assert_eq!(legacy.file_name, "shipyard-darwin-arm64.tar.gz");
        assert_eq!(
            legacy.url,
            "https://shipyard-mirror.oss-cn-hangzhou.aliyuncs.com/binaries/shipyard-cli/v0.3.2/shipyard-darwin-arm64.tar.gz"
        );
    }

    #[test]
    fn test_shipyard_invalid_version() {
        let discovery = discovery();
        let ctx = ctx(&discovery, Os::Linux, Arch::Amd64);
        let err = ShipyardBinaryLocator::new()
            .locate("nightly", false, &ctx)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Parse { .. }));
    }

    #[test]
    fn test_helm_extension_by_os() {
        let discovery = discovery();
        let locator = HelmBinaryLocator::new();

        let linux = locator
            .locate("v3.14.2", false, &ctx(&discovery, Os::Linux, Arch::Amd64))
            .unwrap();
        assert_eq!(linux.file_name, "helm-v3.14.2-linux-amd64.tar.gz");
        assert_eq!(linux.url, "https://get.helm.sh/helm-v3.14.2-linux-amd64.tar.gz");

        let windows = locator
            .locate("v3.14.2", true, &ctx(&discovery, Os::Windows, Arch::Amd64))
            .unwrap();
        assert_eq!(windows.file_name, "helm-v3.14.2-windows-amd64.zip");
        assert_eq!(
            windows.url,
            "https://shipyard-mirror.oss-cn-hangzhou.aliyuncs.com/binaries/helm/v3.14.2/helm-v3.14.2-windows-amd64.zip"
        );

        let err = locator
            .locate("v3.14.2", false, &ctx(&discovery, Os::Darwin, Arch::Arm64))
            .unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedPlatform { ref platform, .. } if platform == "darwin/arm64"));
    }

    #[tokio::test]
    async fn test_helm_latest_is_reference_version() {
        let discovery = discovery();
        let ctx = ctx(&discovery, Os::Linux, Arch::Amd64);
        assert_eq!(
            HelmBinaryLocator::new().discover_latest(&ctx).await.unwrap(),
            HELM_REFERENCE_VERSION
        );
    }
}

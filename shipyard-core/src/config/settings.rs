//! Settings for artifact acquisition.
//!
//! Settings can be loaded from a JSON file and overridden from the
//! environment. Every upstream location lives in [`Endpoints`] so the
//! resolver never hard-codes a host.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::artifacts::error::{ArtifactError, Result};
use crate::artifacts::types::Platform;

// =============================================================================
// Defaults
// =============================================================================

/// Name of the cache root directory created under the user's home.
pub const DEFAULT_HOME_DIR: &str = ".shipyard";

/// Environment variable overriding the cache root.
pub const HOME_ENV: &str = "SHIPYARD_HOME";

/// Environment variable overriding the regional mirror base URL.
pub const MIRROR_ENV: &str = "SHIPYARD_MIRROR_URL";

/// Environment variable holding a release-hosting API token.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Returns `~/.shipyard`, or a directory under the OS temp folder when no
/// home directory can be determined.
pub fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_HOME_DIR)
}

// =============================================================================
// Endpoints
// =============================================================================

/// Upstream locations used for version discovery and downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Chart repository index document.
    pub chart_index_url: String,
    /// Base for chart release downloads: `{base}/{name}-{version}/{file}`.
    pub chart_release_base: String,
    /// Release-hosting REST API base.
    pub release_api_base: String,
    /// Release-hosting download base: `{base}/{owner}/{repo}/releases/download/...`.
    pub release_download_base: String,
    /// Base for helm binary downloads.
    pub helm_download_base: String,
    /// Regional mirror static-file base.
    pub region_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            chart_index_url: "https://shipyard-io.github.io/helm-charts/index.yaml".to_string(),
            chart_release_base: "https://github.com/shipyard-io/helm-charts/releases/download"
                .to_string(),
            release_api_base: "https://api.github.com".to_string(),
            release_download_base: "https://github.com".to_string(),
            helm_download_base: "https://get.helm.sh".to_string(),
            region_base: "https://shipyard-mirror.oss-cn-hangzhou.aliyuncs.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at `base` (used by tests and air-gapped mirrors).
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            chart_index_url: format!("{}/charts/index.yaml", base),
            chart_release_base: format!("{}/chart-releases", base),
            release_api_base: format!("{}/api", base),
            release_download_base: format!("{}/releases", base),
            helm_download_base: format!("{}/helm", base),
            region_base: format!("{}/mirror", base),
        }
    }
}

// =============================================================================
// OCI
// =============================================================================

/// OCI registry transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OciSettings {
    /// Talk to registries over plain HTTP instead of HTTPS.
    pub plain_http: bool,
}

// =============================================================================
// Artifact Settings
// =============================================================================

/// Settings shared by every acquisition made through one manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// Root of the on-disk artifact cache.
    pub cache_root: PathBuf,

    /// Upstream locations.
    pub endpoints: Endpoints,

    /// OCI registry transport.
    pub oci: OciSettings,

    /// Target platform for binaries. `None` means the host is unsupported.
    pub platform: Option<Platform>,

    /// Optional token for the release-hosting API (raises rate limits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            endpoints: Endpoints::default(),
            oci: OciSettings::default(),
            platform: Platform::detect(),
            github_token: None,
        }
    }
}

impl ArtifactSettings {
    /// Loads settings from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
        serde_json::from_str(&json).map_err(|e| {
            ArtifactError::InvalidArgument(format!(
                "Failed to parse settings {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies `SHIPYARD_HOME`, `SHIPYARD_MIRROR_URL` and `GITHUB_TOKEN`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(home) = non_empty(HOME_ENV) {
            self.cache_root = PathBuf::from(home);
        }
        if let Some(mirror) = non_empty(MIRROR_ENV) {
            self.endpoints.region_base = mirror.trim_end_matches('/').to_string();
        }
        if let Some(token) = non_empty(GITHUB_TOKEN_ENV) {
            self.github_token = Some(token);
        }

        self
    }

    /// Replaces the cache root.
    pub fn set_cache_root(&mut self, root: impl Into<PathBuf>) {
        self.cache_root = root.into();
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Core types for artifact acquisition.
//!
//! This module defines the artifact kinds, the resolved `Source` identity,
//! cache keys, per-call download options and the target platform.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ArtifactError;

/// Reserved version string meaning "resolve to the newest known version".
pub const LATEST: &str = "latest";

/// Returns true if `version` asks for the newest version.
///
/// An empty (or blank) version is treated the same as [`LATEST`].
pub fn is_latest(version: &str) -> bool {
    let trimmed = version.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(LATEST)
}

// ============================================================================
// Artifact Type
// ============================================================================

/// Kind of artifact being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// A packaged template bundle (`.tgz` chart).
    Chart,
    /// An executable package that gets installed after download.
    Binary,
}

impl ArtifactType {
    /// Returns the lowercase string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chart => "chart",
            Self::Binary => "binary",
        }
    }

    /// Directory segment used for this kind, both in the cache tree and on
    /// the regional mirror.
    pub fn cache_segment(&self) -> &'static str {
        match self {
            Self::Chart => "charts",
            Self::Binary => "binaries",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chart" | "charts" => Ok(Self::Chart),
            "binary" | "binaries" | "bin" => Ok(Self::Binary),
            _ => Err(ArtifactError::UnknownType(s.to_string())),
        }
    }
}

// ============================================================================
// Source
// ============================================================================

/// Resolved, pinned identity of one artifact, ready for transport.
///
/// Built by the source resolver; `version` is never empty and never the
/// latest sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Logical component name (chart or binary name).
    pub name: String,
    /// Concrete version string.
    pub version: String,
    /// Artifact kind.
    #[serde(rename = "type")]
    pub kind: ArtifactType,
    /// Exact file name expected at `url`.
    pub file_name: String,
    /// Transport location, either `http(s)://` or `oci://`.
    pub url: String,
    /// Whether the regional mirror was selected.
    pub from_region: bool,
}

impl Source {
    /// Returns the cache key identifying this artifact's cache slot.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            kind: self.kind,
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Returns true if the URL uses the OCI scheme.
    pub fn is_oci(&self) -> bool {
        self.url.starts_with("oci://")
    }
}

/// The `(type, name, version)` tuple identifying a unique cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ArtifactType,
    pub name: String,
    pub version: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.kind, self.name, self.version)
    }
}

// ============================================================================
// Download Options
// ============================================================================

/// Per-call configuration for the download engine.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Skip the network fetch when the destination file already exists.
    pub enable_cache: bool,
    /// Where executables land. Required for binaries, ignored for charts.
    pub binary_install_dir: Option<PathBuf>,
    /// Upper bound on the network phase. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

// ============================================================================
// Platform
// ============================================================================

/// Operating system of the target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

/// CPU architecture of the target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

/// Target platform (OS + architecture) used to pick binary packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the host platform at compile time.
    ///
    /// Returns `None` if the host is unsupported.
    pub fn detect() -> Option<Self> {
        let os = if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::Darwin
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            return None;
        };

        let arch = if cfg!(target_arch = "x86_64") {
            Arch::Amd64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            return None;
        };

        Some(Self { os, arch })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_latest() {
        assert!(is_latest("latest"));
        assert!(is_latest("LATEST"));
        assert!(is_latest(""));
        assert!(is_latest("  "));
        assert!(!is_latest("v1.0.0"));
        assert!(!is_latest("latest-1"));
    }

    #[test]
    fn test_artifact_type_from_str() {
        assert_eq!("chart".parse::<ArtifactType>().unwrap(), ArtifactType::Chart);
        assert_eq!(
            "Binary".parse::<ArtifactType>().unwrap(),
            ArtifactType::Binary
        );
        assert!(matches!(
            "plugin".parse::<ArtifactType>(),
            Err(ArtifactError::UnknownType(t)) if t == "plugin"
        ));
    }

    #[test]
    fn test_artifact_type_segments() {
        assert_eq!(ArtifactType::Chart.cache_segment(), "charts");
        assert_eq!(ArtifactType::Binary.cache_segment(), "binaries");
        assert_eq!(ArtifactType::Binary.to_string(), "binary");
    }

    #[test]
    fn test_source_serializes_type_field() {
        let source = Source {
            name: "shipyard".to_string(),
            version: "v0.5.0".to_string(),
            kind: ArtifactType::Binary,
            file_name: "shipyard-v0.5.0-linux-amd64.tar.gz".to_string(),
            url: "https://example.com/shipyard.tar.gz".to_string(),
            from_region: false,
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "binary");
        assert_eq!(json["version"], "v0.5.0");
        assert!(!source.is_oci());
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey {
            kind: ArtifactType::Chart,
            name: "shipyard".to_string(),
            version: "1.0.0".to_string(),
        };
        assert_eq!(key.to_string(), "chart/shipyard@1.0.0");
    }

    #[test]
    fn test_platform_detect() {
        let platform = Platform::detect();
        #[cfg(all(
            any(target_os = "linux", target_os = "macos", target_os = "windows"),
            any(target_arch = "x86_64", target_arch = "aarch64")
        ))]
        assert!(platform.is_some());
        let _ = platform;
    }

    #[test]
    fn test_platform_display_and_serde() {
        let platform = Platform::new(Os::Darwin, Arch::Arm64);
        assert_eq!(platform.to_string(), "darwin/arm64");

        let parsed: Platform =
            serde_json::from_str(r#"{"os":"linux","arch":"amd64"}"#).unwrap();
        assert_eq!(parsed, Platform::new(Os::Linux, Arch::Amd64));
    }
}

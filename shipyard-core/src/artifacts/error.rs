//! Error type shared by every stage of artifact acquisition.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving, downloading, extracting or installing an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid version '{version}': {source}")]
    Parse {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("Upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    #[error("{kind} '{name}' not found: {detail}")]
    NotFound {
        kind: String,
        name: String,
        detail: String,
    },

    #[error("Invalid chart index at {url}: {reason}")]
    InvalidIndex { url: String, reason: String },

    #[error("{name} is not available for platform {platform}")]
    UnsupportedPlatform { name: String, platform: String },

    #[error("Unsupported archive format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Binary '{name}' requires an install directory")]
    MissingInstallDir { name: String },

    #[error("Unknown artifact type: {0}")]
    UnknownType(String),

    #[error("Download of {url} failed with status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Acquisition of '{name}' cancelled after {deadline:?}")]
    Cancelled { name: String, deadline: Duration },
}

impl ArtifactError {
    /// Wraps an IO error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn upstream(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;

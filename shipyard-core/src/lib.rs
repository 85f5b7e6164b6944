//! Shipyard Core Library
//!
//! This crate provides the artifact plumbing behind Shipyard's installer:
//!
//! - Resolution of chart and binary versions against public upstreams or the
//!   regional mirror
//! - A deterministic on-disk artifact cache
//! - Streaming HTTP and OCI downloads
//! - Archive extraction and executable installation
//! - Configuration loaded from JSON and the environment

pub mod artifacts;
pub mod config;

// Re-exports for convenience
pub use artifacts::{
    AcquireOptions, AcquiredArtifact, ArtifactError, ArtifactManager, ArtifactRequest,
    ArtifactType, Platform, Source,
};
pub use config::ArtifactSettings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

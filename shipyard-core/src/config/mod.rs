//! Configuration module for Shipyard.
//!
//! Manages artifact settings loaded from JSON and the environment.

mod settings;

pub use settings::{
    default_cache_root, ArtifactSettings, Endpoints, OciSettings, DEFAULT_HOME_DIR,
    GITHUB_TOKEN_ENV, HOME_ENV, MIRROR_ENV,
};

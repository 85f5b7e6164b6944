//! Cache path allocation for downloaded artifacts.
//!
//! Every artifact owns one deterministic directory under the cache root:
//!
//! - Charts: `{root}/artifacts/charts/{name}/{version}/pkg`
//! - Binary packages: `{root}/artifacts/binaries/{name}/{version}/pkg`
//! - Installed binaries: `{root}/artifacts/binaries/{name}/{version}/bin`
//!
//! There is no index file; the directory tree is the record of what is cached.

use std::path::{Component, Path, PathBuf};

use super::error::{ArtifactError, Result};
use super::types::ArtifactType;

/// Subdirectory name under the cache root.
const ARTIFACTS_DIR: &str = "artifacts";

const PACKAGE_DIR: &str = "pkg";
const INSTALL_DIR: &str = "bin";

/// Maps artifact identities to directories under a cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates an allocator rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replaces the cache root.
    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    /// Returns `{root}/artifacts`.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    /// Returns the directory for an artifact.
    ///
    /// For binaries, `want_install_path` selects the installed-executable
    /// directory instead of the downloaded package directory. Charts ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::InvalidArgument`] if `name` or `version` is not
    /// a single plain path component, since such values could collide with
    /// other keys or escape the cache root.
    pub fn allocate(
        &self,
        kind: ArtifactType,
        name: &str,
        version: &str,
        want_install_path: bool,
    ) -> Result<PathBuf> {
        check_component("name", name)?;
        check_component("version", version)?;

        let leaf = match (kind, want_install_path) {
            (ArtifactType::Binary, true) => INSTALL_DIR,
            _ => PACKAGE_DIR,
        };

        Ok(self.kind_dir(kind).join(name).join(version).join(leaf))
    }

    /// Same as [`allocate`](Self::allocate) for callers holding the type as a string.
    pub fn allocate_str(
        &self,
        kind: &str,
        name: &str,
        version: &str,
        want_install_path: bool,
    ) -> Result<PathBuf> {
        self.allocate(kind.parse()?, name, version, want_install_path)
    }

    /// Lists the versions of `name` currently present in the cache, sorted.
    ///
    /// A missing directory yields an empty list.
    pub fn cached_versions(&self, kind: ArtifactType, name: &str) -> Result<Vec<String>> {
        check_component("name", name)?;
        let dir = self.kind_dir(kind).join(name);

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArtifactError::io(&dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArtifactError::io(&dir, e))?;
            if entry.path().is_dir() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        versions.sort();
        Ok(versions)
    }

    fn kind_dir(&self, kind: ArtifactType) -> PathBuf {
        self.artifacts_dir().join(kind.cache_segment())
    }
}

fn check_component(what: &str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();
    let is_single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == value
    );

    if value.is_empty() || value.contains(['/', '\\']) || !is_single_normal {
        return Err(ArtifactError::InvalidArgument(format!(
            "{} '{}' is not a valid path component",
            what, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths() -> CachePaths {
        CachePaths::new("/home/dev/.shipyard")
    }

    #[test]
    fn test_chart_path_ignores_install_flag() {
        let expected = PathBuf::from("/home/dev/.shipyard/artifacts/charts/shipyard/1.0.0/pkg");
        assert_eq!(
            paths()
                .allocate(ArtifactType::Chart, "shipyard", "1.0.0", false)
                .unwrap(),
            expected
        );
        assert_eq!(
            paths()
                .allocate(ArtifactType::Chart, "shipyard", "1.0.0", true)
                .unwrap(),
            expected
        );
    }

    #[test]
    fn test_binary_paths() {
        let pkg = paths()
            .allocate(ArtifactType::Binary, "helm", "v3.14.2", false)
            .unwrap();
        let bin = paths()
            .allocate(ArtifactType::Binary, "helm", "v3.14.2", true)
            .unwrap();
        assert_eq!(
            pkg,
            PathBuf::from("/home/dev/.shipyard/artifacts/binaries/helm/v3.14.2/pkg")
        );
        assert_eq!(
            bin,
            PathBuf::from("/home/dev/.shipyard/artifacts/binaries/helm/v3.14.2/bin")
        );
    }

    #[test]
    fn test_same_key_same_path_distinct_keys_distinct_paths() {
        let p = paths();
        let a = p.allocate(ArtifactType::Chart, "a", "1.0.0", false).unwrap();
        let b = p.allocate(ArtifactType::Chart, "a", "1.0.0", false).unwrap();
        assert_eq!(a, b);

        let others = [
            p.allocate(ArtifactType::Binary, "a", "1.0.0", false).unwrap(),
            p.allocate(ArtifactType::Chart, "b", "1.0.0", false).unwrap(),
            p.allocate(ArtifactType::Chart, "a", "1.0.1", false).unwrap(),
        ];
        for other in &others {
            assert_ne!(&a, other);
        }
    }

    #[test]
    fn test_rejects_unsafe_components() {
        let p = paths();
        for bad in ["", ".", "..", "a/b", "a\\b", "/abs"] {
            assert!(
                matches!(
                    p.allocate(ArtifactType::Chart, bad, "1.0.0", false),
                    Err(ArtifactError::InvalidArgument(_))
                ),
                "name {:?} should be rejected",
                bad
            );
            assert!(p.allocate(ArtifactType::Chart, "ok", bad, false).is_err());
        }
    }

    #[test]
    fn test_allocate_str_unknown_type() {
        let err = paths()
            .allocate_str("plugin", "x", "1.0.0", false)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::UnknownType(_)));
        assert!(paths().allocate_str("binary", "x", "1.0.0", true).is_ok());
    }

    #[test]
    fn test_set_root() {
        let mut p = paths();
        p.set_root("/srv/cache");
        assert_eq!(p.root(), Path::new("/srv/cache"));
        assert!(p
            .allocate(ArtifactType::Chart, "x", "1", false)
            .unwrap()
            .starts_with("/srv/cache/artifacts"));
    }

    #[test]
    fn test_cached_versions() {
        let temp_dir = TempDir::new().unwrap();
        let p = CachePaths::new(temp_dir.path());

        assert!(p
            .cached_versions(ArtifactType::Chart, "shipyard")
            .unwrap()
            .is_empty());

        for version in ["1.1.0", "1.0.0"] {
            let dir = p
                .allocate(ArtifactType::Chart, "shipyard", version, false)
                .unwrap();
            std::fs::create_dir_all(dir).unwrap();
        }

        assert_eq!(
            p.cached_versions(ArtifactType::Chart, "shipyard").unwrap(),
            vec!["1.0.0".to_string(), "1.1.0".to_string()]
        );
        assert!(p
            .cached_versions(ArtifactType::Binary, "shipyard")
            .unwrap()
            .is_empty());
    }
}

//! Installation of executables out of downloaded binary packages.
//!
//! The package is extracted into a scratch directory, then every regular
//! file carrying an executable bit is moved into the install directory.
//! Everything else in the package is discarded with the scratch directory.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{ArtifactError, Result};
use super::extractor;

/// Installs the executables contained in `package_file` into `install_dir`.
///
/// Existing files with the same name are overwritten. Returns the installed
/// paths; an archive without executables yields an empty list rather than an
/// error, callers decide whether that is acceptable.
pub fn install(package_file: &Path, install_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(install_dir).map_err(|e| ArtifactError::io(install_dir, e))?;

    // Removed on drop, whichever way this function returns.
    let scratch = tempfile::Builder::new()
        .prefix("shipyard-install-")
        .tempdir()
        .map_err(|e| ArtifactError::io(std::env::temp_dir(), e))?;

    extractor::extract(package_file, scratch.path())?;

    let mut installed = Vec::new();
    for entry in WalkDir::new(scratch.path()) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(scratch.path()).to_path_buf();
            ArtifactError::io(path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|e| ArtifactError::io(entry.path(), e.into()))?;
        if !is_executable(entry.path(), &metadata) {
            debug!("Ignoring non-executable {}", entry.path().display());
            continue;
        }

        let dest = install_dir.join(entry.file_name());
        move_file(entry.path(), &dest)?;
        info!("Installed {}", dest.display());
        installed.push(dest);
    }

    if installed.is_empty() {
        warn!("No executable found in {}", package_file.display());
    }

    Ok(installed)
}

#[cfg(unix)]
fn is_executable(_path: &Path, metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(path: &Path, _metadata: &fs::Metadata) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

/// Moves a file, falling back to copy + remove across file systems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        fs::remove_file(to).map_err(|e| ArtifactError::io(to, e))?;
    }

    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    // fs::copy carries the permission bits along
    fs::copy(from, to).map_err(|e| ArtifactError::io(to, e))?;
    fs::remove_file(from).map_err(|e| ArtifactError::io(from, e))?;
    Ok(())
}

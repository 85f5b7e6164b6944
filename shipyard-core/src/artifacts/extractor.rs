//! Archive extraction for downloaded packages.
//!
//! Handles zip and gzip-compressed tar archives. Regular files keep the
//! owner/group/other read and execute bits recorded in the archive, which is
//! how the executable bit reaches installed binaries. Special and
//! group/world-writable bits are dropped.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path};
use tracing::{debug, info, warn};

use super::error::{ArtifactError, Result};

// ============================================================================
// Archive Format
// ============================================================================

/// Archive format of a downloaded package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// ZIP archive (.zip)
    Zip,
    /// Gzip-compressed tar archive (.tar.gz, .tgz, .gz)
    TarGz,
}

impl ArchiveFormat {
    /// Infers the archive format from a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

// ============================================================================
// Archive Extraction
// ============================================================================

/// Extracts an archive into `dest_dir`, picking the format from the extension.
///
/// Partially extracted output is left in place on failure.
///
/// # Errors
///
/// - [`ArtifactError::UnsupportedFormat`] for unknown extensions.
/// - [`ArtifactError::Io`] for any read or write failure.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let format = ArchiveFormat::from_path(archive_path).ok_or_else(|| {
        ArtifactError::UnsupportedFormat {
            path: archive_path.to_path_buf(),
        }
    })?;

    info!(
        "Extracting {:?} archive {} to {}",
        format,
        archive_path.display(),
        dest_dir.display()
    );

    fs::create_dir_all(dest_dir).map_err(|e| ArtifactError::io(dest_dir, e))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
    }
}

// ============================================================================
// ZIP Extraction
// ============================================================================

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| ArtifactError::io(archive_path, e))?;

    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ArtifactError::io(archive_path, zip_to_io(e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArtifactError::io(archive_path, zip_to_io(e)))?;

        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                warn!("Skipping unsafe path in zip: {}", entry.name());
                continue;
            }
        };

        let dest_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| ArtifactError::io(&dest_path, e))?;
            continue;
        }

        let mode = entry.unix_mode();
        if is_zip_symlink(mode) {
            warn!("Skipping symlink in zip archive: {}", entry_path.display());
            continue;
        }

        write_entry(&mut entry, &dest_path, mode)?;
    }

    debug!("ZIP extraction complete");
    Ok(())
}

fn is_zip_symlink(mode: Option<u32>) -> bool {
    const S_IFMT: u32 = 0o170000;
    const S_IFLNK: u32 = 0o120000;
    mode.is_some_and(|m| m & S_IFMT == S_IFLNK)
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

// ============================================================================
// TAR.GZ Extraction
// ============================================================================

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| ArtifactError::io(archive_path, e))?;

    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| ArtifactError::io(archive_path, e))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| ArtifactError::io(archive_path, e))?;
        let entry_type = entry.header().entry_type();

        // Links could point outside dest_dir
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping symlink/hardlink in tar archive");
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| ArtifactError::io(archive_path, e))?
            .into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            warn!("Skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| ArtifactError::io(&dest_path, e))?;
        } else if entry_type.is_file() {
            let mode = entry.header().mode().ok();
            write_entry(&mut entry, &dest_path, mode)?;
        } else {
            debug!("Skipping {:?} entry {:?}", entry_type, path);
        }
    }

    debug!("TAR extraction complete");
    Ok(())
}

// ============================================================================
// Common
// ============================================================================

fn write_entry<R: Read>(reader: &mut R, dest_path: &Path, mode: Option<u32>) -> Result<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
    }

    let mut outfile = File::create(dest_path).map_err(|e| ArtifactError::io(dest_path, e))?;
    io::copy(reader, &mut outfile).map_err(|e| ArtifactError::io(dest_path, e))?;

    #[cfg(unix)]
    set_unix_permissions(dest_path, mode)?;
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // Archive contents are untrusted: drop setuid, setgid, sticky and
    // group/world write. A zero mode would leave the file unreadable.
    const ALLOWED_BITS: u32 = 0o755;
    let Some(bits) = mode.map(|m| m & ALLOWED_BITS).filter(|m| *m != 0) else {
        return Ok(());
    };

    fs::set_permissions(path, fs::Permissions::from_mode(bits))
        .map_err(|e| ArtifactError::io(path, e))
}

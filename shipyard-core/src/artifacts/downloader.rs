//! Download engine: cache check, transfer, and hand-off to the installer.
//!
//! HTTP bodies are streamed into a temporary file next to the destination and
//! renamed into place once complete. A transfer that fails or is dropped
//! midway leaves nothing at the final path, so a later cache check never
//! mistakes a partial file for a finished one.

use futures::StreamExt;
use reqwest::{Response, StatusCode};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::error::{ArtifactError, Result};
use super::installer;
use super::oci::OciClient;
use super::types::{ArtifactType, DownloadOptions, Os, Platform, Source};

// ============================================================================
// Streaming
// ============================================================================

/// Streams `response` into `dest` through a temporary sibling file.
///
/// Returns the number of bytes written. The parent directory of `dest` must
/// exist.
pub(crate) async fn stream_to_file(response: Response, url: &str, dest: &Path) -> Result<u64> {
    let dir = dest
        .parent()
        .ok_or_else(|| ArtifactError::InvalidArgument(format!("no parent for {}", dest.display())))?;

    // Deleted on drop unless persisted.
    let temp_path = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(dir)
        .map_err(|e| ArtifactError::io(dir, e))?
        .into_temp_path();

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| ArtifactError::io(&temp_path, e))?;

    debug!("Content-Length: {:?}", response.content_length());

    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ArtifactError::upstream(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ArtifactError::io(&temp_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| ArtifactError::io(&temp_path, e))?;
    drop(file);

    temp_path
        .persist(dest)
        .map_err(|e| ArtifactError::io(dest, e.error))?;

    debug!("Wrote {} bytes to {}", bytes_written, dest.display());
    Ok(bytes_written)
}

// ============================================================================
// Downloader
// ============================================================================

/// Fetches resolved sources into the cache and installs binaries.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    oci: OciClient,
    platform: Option<Platform>,
}

impl Downloader {
    /// `platform` decides the executable suffix of installed binaries; `None`
    /// falls back to the host's convention.
    pub fn new(client: reqwest::Client, oci: OciClient, platform: Option<Platform>) -> Self {
        Self {
            client,
            oci,
            platform,
        }
    }

    /// Makes `source` available locally and returns its path.
    ///
    /// 1. With caching enabled, an existing `dest_dir/<file_name>` skips the
    ///    network entirely.
    /// 2. Otherwise the package is pulled from its OCI registry or fetched
    ///    over HTTP(S). Any status other than 200 is a
    ///    [`ArtifactError::DownloadFailed`].
    /// 3. Charts return the package path. Binaries are installed into
    ///    `options.binary_install_dir` and the executable path is returned.
    ///
    /// `options.deadline` bounds step 2 and yields [`ArtifactError::Cancelled`]
    /// when it elapses.
    pub async fn fetch(
        &self,
        source: &Source,
        dest_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<PathBuf> {
        let install_dir = match source.kind {
            ArtifactType::Binary => Some(
                options
                    .binary_install_dir
                    .clone()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .ok_or_else(|| ArtifactError::MissingInstallDir {
                        name: source.name.clone(),
                    })?,
            ),
            ArtifactType::Chart => None,
        };

        let local = dest_dir.join(&source.file_name);

        if options.enable_cache && is_present(&local).await? {
            info!("Cache hit for {} at {}", source.cache_key(), local.display());
        } else {
            tokio::fs::create_dir_all(dest_dir)
                .await
                .map_err(|e| ArtifactError::io(dest_dir, e))?;

            let transfer = self.transfer(source, dest_dir, &local);
            match options.deadline {
                Some(deadline) => tokio::time::timeout(deadline, transfer)
                    .await
                    .map_err(|_| ArtifactError::Cancelled {
                        name: source.name.clone(),
                        deadline,
                    })??,
                None => transfer.await?,
            }
        }

        let Some(install_dir) = install_dir else {
            return Ok(local);
        };

        let package = local.clone();
        let target = install_dir.clone();
        tokio::task::spawn_blocking(move || installer::install(&package, &target))
            .await
            .map_err(|e| ArtifactError::io(&local, io::Error::new(io::ErrorKind::Other, e)))??;

        Ok(install_dir.join(self.executable_name(&source.name)))
    }

    async fn transfer(&self, source: &Source, dest_dir: &Path, local: &Path) -> Result<()> {
        if source.is_oci() && source.kind == ArtifactType::Chart {
            self.oci
                .pull_chart(&source.url, &source.version, dest_dir)
                .await?;
            return Ok(());
        }

        info!("Downloading {} to {}", source.url, local.display());
        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| ArtifactError::upstream(&source.url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ArtifactError::DownloadFailed {
                url: source.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = stream_to_file(response, &source.url, local).await?;
        info!("Downloaded {} ({} bytes)", source.file_name, bytes);
        Ok(())
    }

    fn executable_name(&self, name: &str) -> String {
        let windows = match self.platform {
            Some(platform) => platform.os == Os::Windows,
            None => cfg!(windows),
        };
        if windows {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }
}

async fn is_present(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ArtifactError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::types::Arch;
    use httpmock::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn downloader() -> Downloader {
        Downloader::new(
            reqwest::Client::new(),
            OciClient::new(reqwest::Client::new(), true),
            Some(Platform::new(Os::Linux, Arch::Amd64)),
        )
    }

    fn chart_source(url: String) -> Source {
        Source {
            name: "shipyard".to_string(),
            version: "1.0.0".to_string(),
            kind: ArtifactType::Chart,
            file_name: "shipyard-1.0.0.tgz".to_string(),
            url,
            from_region: false,
        }
    }

    fn cached_options() -> DownloadOptions {
        DownloadOptions {
            enable_cache: true,
            ..Default::default()
        }
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_fetch_chart_then_cache_hit() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/shipyard-1.0.0.tgz");
                then.status(200).body("chart-package");
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest_dir = temp_dir.path().join("pkg");
        let source = chart_source(server.url("/shipyard-1.0.0.tgz"));
        let downloader = downloader();

        let first = downloader
            .fetch(&source, &dest_dir, &cached_options())
            .await
            .unwrap();
        assert_eq!(first, dest_dir.join("shipyard-1.0.0.tgz"));
        assert_eq!(std::fs::read(&first).unwrap(), b"chart-package");
        let modified = std::fs::metadata(&first).unwrap().modified().unwrap();

        let second = downloader
            .fetch(&source, &dest_dir, &cached_options())
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(std::fs::metadata(&second).unwrap().modified().unwrap(), modified);

        mock.assert_hits_async(1).await;
        assert_eq!(leftovers(&dest_dir), vec!["shipyard-1.0.0.tgz".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_without_cache_downloads_again() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/shipyard-1.0.0.tgz");
                then.status(200).body("chart-package");
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let source = chart_source(server.url("/shipyard-1.0.0.tgz"));
        let downloader = downloader();
        let options = DownloadOptions::default();

        downloader.fetch(&source, temp_dir.path(), &options).await.unwrap();
        downloader.fetch(&source, temp_dir.path(), &options).await.unwrap();

        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_non_ok_status_leaves_nothing_behind() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/shipyard-1.0.0.tgz");
                then.status(404);
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let source = chart_source(server.url("/shipyard-1.0.0.tgz"));

        let err = downloader()
            .fetch(&source, temp_dir.path(), &cached_options())
            .await
            .unwrap_err();

        assert!(matches!(err, ArtifactError::DownloadFailed { status: 404, .. }));
        assert!(leftovers(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_deadline_cancels_transfer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/shipyard-1.0.0.tgz");
                then.status(200)
                    .body("chart-package")
                    .delay(Duration::from_secs(5));
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let source = chart_source(server.url("/shipyard-1.0.0.tgz"));
        let options = DownloadOptions {
            enable_cache: true,
            deadline: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let err = downloader()
            .fetch(&source, temp_dir.path(), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, ArtifactError::Cancelled { ref name, .. } if name == "shipyard"));
        assert!(!temp_dir.path().join("shipyard-1.0.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_binary_requires_install_dir() {
        let temp_dir = TempDir::new().unwrap();
        let source = Source {
            kind: ArtifactType::Binary,
            ..chart_source("http://127.0.0.1:1/unused".to_string())
        };

        let err = downloader()
            .fetch(&source, temp_dir.path(), &cached_options())
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::MissingInstallDir { ref name } if name == "shipyard"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_binary_installs_executable() {
        let mut package = Vec::new();
        {
            let encoder =
                flate2::write::GzEncoder::new(&mut package, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for (name, data, mode) in [
                ("linux-amd64/helm", &b"#!/bin/sh\n"[..], 0o755),
                ("linux-amd64/LICENSE", &b"Apache"[..], 0o644),
            ] {
                let mut header = tar::Header::new_gnu();
                header.set_path(name).unwrap();
                header.set_size(data.len() as u64);
                header.set_mode(mode);
                header.set_cksum();
                builder.append(&header, data).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/helm-v3.14.2-linux-amd64.tar.gz");
                then.status(200).body(package.clone());
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let pkg_dir = temp_dir.path().join("pkg");
        let bin_dir = temp_dir.path().join("bin");
        let source = Source {
            name: "helm".to_string(),
            version: "v3.14.2".to_string(),
            kind: ArtifactType::Binary,
            file_name: "helm-v3.14.2-linux-amd64.tar.gz".to_string(),
            url: server.url("/helm-v3.14.2-linux-amd64.tar.gz"),
            from_region: false,
        };
        let options = DownloadOptions {
            enable_cache: true,
            binary_install_dir: Some(bin_dir.clone()),
            deadline: None,
        };

        let path = downloader().fetch(&source, &pkg_dir, &options).await.unwrap();

        assert_eq!(path, bin_dir.join("helm"));
        assert!(path.is_file());
        assert!(!bin_dir.join("LICENSE").exists());
        assert!(pkg_dir.join("helm-v3.14.2-linux-amd64.tar.gz").is_file());
    }

    #[tokio::test]
    async fn test_fetch_oci_chart_then_cache_hit() {
        let digest = "sha256:4f1c2d";
        let server = MockServer::start_async().await;
        let manifest = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v2/charts/postgres-operator/manifests/0.2.0");
                then.status(200).body(
                    serde_json::json!({
                        "schemaVersion": 2,
                        "layers": [{
                            "mediaType": crate::artifacts::oci::CHART_LAYER_MEDIA_TYPE,
                            "digest": digest,
                            "size": 9
                        }]
                    })
                    .to_string(),
                );
            })
            .await;
        let blob = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/v2/charts/postgres-operator/blobs/{}", digest));
                then.status(200).body("oci-chart");
            })
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest_dir = temp_dir.path().join("pkg");
        let source = Source {
            name: "postgres-operator".to_string(),
            version: "0.2.0".to_string(),
            kind: ArtifactType::Chart,
            file_name: "postgres-operator-0.2.0.tgz".to_string(),
            url: format!("oci://{}/charts/postgres-operator", server.address()),
            from_region: false,
        };
        let downloader = downloader();

        let first = downloader
            .fetch(&source, &dest_dir, &cached_options())
            .await
            .unwrap();
        assert_eq!(first, dest_dir.join("postgres-operator-0.2.0.tgz"));
        assert_eq!(std::fs::read(&first).unwrap(), b"oci-chart");

        let second = downloader
            .fetch(&source, &dest_dir, &cached_options())
            .await
            .unwrap();
        assert_eq!(second, first);

        manifest.assert_hits_async(1).await;
        blob.assert_hits_async(1).await;
        assert_eq!(
            leftovers(&dest_dir),
            vec!["postgres-operator-0.2.0.tgz".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cache_stat_error_is_io() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the package directory should be: stat fails
        // with ENOTDIR rather than NotFound.
        let not_a_dir = temp_dir.path().join("pkg");
        std::fs::write(&not_a_dir, b"file").unwrap();
        let source = chart_source("http://127.0.0.1:1/unused".to_string());

        let err = downloader()
            .fetch(&source, &not_a_dir, &cached_options())
            .await
            .unwrap_err();

        assert!(
            matches!(err, ArtifactError::Io { ref path, .. } if path == &not_a_dir.join("shipyard-1.0.0.tgz"))
        );
    }

    #[test]
    fn test_windows_executable_suffix() {
        let downloader = Downloader::new(
            reqwest::Client::new(),
            OciClient::new(reqwest::Client::new(), false),
            Some(Platform::new(Os::Windows, Arch::Amd64)),
        );
        assert_eq!(downloader.executable_name("helm"), "helm.exe");
    }
}

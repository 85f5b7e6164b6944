//! Minimal OCI registry client for pulling chart packages.
//!
//! Speaks the Distribution API v2: fetch the manifest for `repository:tag`,
//! pick the chart content layer and download its blob. Anonymous bearer-token
//! challenges (`WWW-Authenticate: Bearer realm=...`) are answered
//! transparently; credentials are out of scope.

use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use super::downloader::stream_to_file;
use super::error::{ArtifactError, Result};
use super::types::ArtifactType;

/// OCI image manifest media type.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Media type of the layer holding a packaged chart.
pub const CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";

// ============================================================================
// Reference
// ============================================================================

/// A parsed `oci://registry/repository` URL plus tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    /// Registry host, with port if any.
    pub registry: String,
    /// Repository path inside the registry.
    pub repository: String,
    /// Tag derived from the chart version.
    pub tag: String,
}

impl OciReference {
    /// Parses `oci://host[:port]/path` and derives the tag from `version`.
    ///
    /// Registries reject `+` in tags, so it is replaced with `_`.
    pub fn parse(url: &str, version: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            ArtifactError::InvalidArgument(format!("invalid OCI reference '{}': {}", url, reason))
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if parsed.scheme() != "oci" {
            return Err(invalid("scheme must be oci"));
        }

        let host = parsed.host_str().ok_or_else(|| invalid("missing registry host"))?;
        let registry = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let repository = parsed.path().trim_matches('/').to_string();
        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }

        if version.trim().is_empty() {
            return Err(invalid("missing version"));
        }

        Ok(Self {
            registry,
            repository,
            tag: version.replace('+', "_"),
        })
    }

    /// Last path segment of the repository, which is the chart name.
    pub fn chart_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    media_type: String,
    digest: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Pulls charts from OCI registries.
#[derive(Debug, Clone)]
pub struct OciClient {
    client: reqwest::Client,
    plain_http: bool,
}

impl OciClient {
    pub fn new(client: reqwest::Client, plain_http: bool) -> Self {
        Self { client, plain_http }
    }

    /// Pulls `url` at `version` into `dest_dir`.
    ///
    /// The package is written as `{chart}-{version}.tgz`, the same name a
    /// chart locator assigns, and only appears once fully downloaded.
    pub async fn pull_chart(&self, url: &str, version: &str, dest_dir: &Path) -> Result<PathBuf> {
        let reference = OciReference::parse(url, version)?;
        let base = self.registry_base(&reference);
        let mut token: Option<String> = None;

        let manifest_url = format!(
            "{}/v2/{}/manifests/{}",
            base, reference.repository, reference.tag
        );
        info!("Pulling {}:{}", url, reference.tag);

        let response = self
            .send_authorized(&manifest_url, MANIFEST_MEDIA_TYPE, &mut token)
            .await?;
        let manifest: Manifest = response
            .json()
            .await
            .map_err(|e| ArtifactError::upstream(&manifest_url, e))?;

        let layer = manifest
            .layers
            .iter()
            .find(|layer| layer.media_type == CHART_LAYER_MEDIA_TYPE)
            .ok_or_else(|| ArtifactError::NotFound {
                kind: ArtifactType::Chart.to_string(),
                name: reference.chart_name().to_string(),
                detail: format!("no chart layer in manifest {}", manifest_url),
            })?;
        debug!("Chart layer {} ({} bytes)", layer.digest, layer.size);

        let blob_url = format!(
            "{}/v2/{}/blobs/{}",
            base, reference.repository, layer.digest
        );
        let response = self
            .send_authorized(&blob_url, CHART_LAYER_MEDIA_TYPE, &mut token)
            .await?;

        let dest = dest_dir.join(format!("{}-{}.tgz", reference.chart_name(), version));
        stream_to_file(response, &blob_url, &dest).await?;

        info!("Pulled {} to {}", url, dest.display());
        Ok(dest)
    }

    fn registry_base(&self, reference: &OciReference) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!("{}://{}", scheme, reference.registry)
    }

    /// GETs `url`, answering one bearer challenge if the registry sends it.
    async fn send_authorized(
        &self,
        url: &str,
        accept: &str,
        token: &mut Option<String>,
    ) -> Result<Response> {
        let response = self.send(self.request(url, accept, token.as_deref())).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED && token.is_none() {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ArtifactError::upstream(url, "unauthorized without challenge"))?
                .to_string();

            let fetched = self.fetch_token(url, &challenge).await?;
            let retried = self.send(self.request(url, accept, Some(&fetched))).await?;
            *token = Some(fetched);
            retried
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn request(&self, url: &str, accept: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.client.get(url).header(ACCEPT, accept);
        match token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request
            .build()
            .map_err(|e| ArtifactError::upstream("<oci request>", e))?;
        let url = request.url().to_string();
        self.client
            .execute(request)
            .await
            .map_err(|e| ArtifactError::upstream(url, e))
    }

    async fn fetch_token(&self, url: &str, challenge: &str) -> Result<String> {
        let params = parse_bearer_challenge(challenge)
            .ok_or_else(|| ArtifactError::upstream(url, format!("unsupported challenge: {}", challenge)))?;

        let realm = params
            .get("realm")
            .ok_or_else(|| ArtifactError::upstream(url, "challenge without realm"))?;
        let query: Vec<(&str, &str)> = ["service", "scope"]
            .into_iter()
            .filter_map(|key| params.get(key).map(|v| (key, v.as_str())))
            .collect();

        debug!("Requesting registry token from {}", realm);
        let response = self
            .client
            .get(realm)
            .query(&query)
            .send()
            .await
            .map_err(|e| ArtifactError::upstream(realm, e))?;

        if !response.status().is_success() {
            return Err(ArtifactError::upstream(
                realm,
                format!("token request failed with status {}", response.status()),
            ));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ArtifactError::upstream(realm, e))?;

        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ArtifactError::upstream(realm, "token response without token"))
    }
}

/// Parses `Bearer realm="...",service="...",scope="..."` into its parameters.
fn parse_bearer_challenge(header: &str) -> Option<HashMap<String, String>> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params = HashMap::new();
    let mut remaining = rest.trim();
    while !remaining.is_empty() {
        let (key, after_key) = remaining.split_once('=')?;
        let after_key = after_key.trim_start();

        let (value, tail) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            }
        };

        params.insert(key.trim().to_lowercase(), value.to_string());
        remaining = tail.trim_start().trim_start_matches(',').trim_start();
    }

    Some(params)
}

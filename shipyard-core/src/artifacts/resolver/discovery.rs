//! Version discovery strategies.
//!
//! Three independent sources can answer "what is the newest version?":
//!
//! - the regional mirror's plain-text `latest` pointer files,
//! - the chart repository index document,
//! - the release-hosting API's latest published release.
//!
//! They are never reconciled with each other; the caller picks one.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::artifacts::error::{ArtifactError, Result};
use crate::artifacts::types::ArtifactType;
use crate::artifacts::version::parse_version;
use crate::config::Endpoints;

/// Name of the pointer object stored next to each artifact on the mirror.
const LATEST_POINTER: &str = "latest";

// ============================================================================
// Discovery Client
// ============================================================================

/// HTTP client for version discovery.
#[derive(Debug, Clone)]
pub struct Discovery {
    client: reqwest::Client,
    endpoints: Endpoints,
    github_token: Option<String>,
}

impl Discovery {
    pub fn new(client: reqwest::Client, endpoints: Endpoints, github_token: Option<String>) -> Self {
        Self {
            client,
            endpoints,
            github_token,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Reads the regional `latest` pointer for an artifact.
    ///
    /// Path: `{region_base}/{charts|binaries}/{mirror_name}/latest`
    pub async fn fetch_regional_latest(&self, kind: ArtifactType, mirror_name: &str) -> Result<String> {
        let url = format!(
            "{}/{}/{}/{}",
            self.endpoints.region_base.trim_end_matches('/'),
            kind.cache_segment(),
            mirror_name,
            LATEST_POINTER
        );

        let body = self.get_text(&url).await?;
        let version = body.trim().to_string();
        if version.is_empty() {
            return Err(ArtifactError::upstream(url, "latest pointer is empty"));
        }

        info!("Regional mirror reports {} {} at {}", kind, mirror_name, version);
        Ok(version)
    }

    /// Downloads and parses the chart repository index.
    pub async fn fetch_chart_index(&self) -> Result<ChartIndex> {
        let url = &self.endpoints.chart_index_url;
        let body = self.get_text(url).await?;
        ChartIndex::parse(&body, url)
    }

    /// Returns the newest valid version of `name` in the chart index.
    pub async fn fetch_chart_latest(&self, name: &str) -> Result<String> {
        let version = self.fetch_chart_index().await?.latest(name)?;
        info!("Chart index reports {} at {}", name, version);
        Ok(version)
    }

    /// Returns the tag of the latest published release of `owner/repo`.
    pub async fn fetch_latest_release(&self, owner: &str, repo: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Release {
            tag_name: String,
        }

        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.endpoints.release_api_base.trim_end_matches('/'),
            owner,
            repo
        );

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.github_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArtifactError::upstream(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::upstream(&url, format!("status {}", status)));
        }

        let release: Release = response
            .json()
            .await
            .map_err(|e| ArtifactError::upstream(&url, e))?;

        if release.tag_name.trim().is_empty() {
            return Err(ArtifactError::upstream(&url, "release has no tag"));
        }

        info!("Latest release of {}/{} is {}", owner, repo, release.tag_name);
        Ok(release.tag_name)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArtifactError::upstream(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::upstream(url, format!("status {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| ArtifactError::upstream(url, e))
    }
}

// ============================================================================
// Chart Index
// ============================================================================

/// One chart version listed in the index.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Parsed chart repository index, holding only structurally valid entries,
/// newest first per chart.
#[derive(Debug, Clone)]
pub struct ChartIndex {
    url: String,
    entries: HashMap<String, Vec<ChartVersion>>,
}

#[derive(Deserialize)]
struct RawIndex {
    #[serde(rename = "apiVersion", default)]
    api_version: Option<String>,
    #[serde(default)]
    entries: HashMap<String, Vec<serde_yaml::Value>>,
}

const CHART_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

fn chart_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CHART_NAME_PATTERN).expect("chart name pattern is a valid regex"))
}

impl ChartIndex {
    /// Parses an index document fetched from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::InvalidIndex`] if the document is empty, is
    /// not valid YAML, or has no `apiVersion`.
    pub fn parse(yaml: &str, url: &str) -> Result<Self> {
        let invalid = |reason: String| ArtifactError::InvalidIndex {
            url: url.to_string(),
            reason,
        };

        if yaml.trim().is_empty() {
            return Err(invalid("index is empty".to_string()));
        }

        let raw: RawIndex = serde_yaml::from_str(yaml).map_err(|e| invalid(e.to_string()))?;

        if raw.api_version.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(invalid("missing apiVersion".to_string()));
        }

        let mut entries = HashMap::new();
        for (name, values) in raw.entries {
            let mut versions: Vec<ChartVersion> = values
                .into_iter()
                .filter_map(|value| serde_yaml::from_value::<ChartVersion>(value).ok())
                .filter(|cv| is_valid_entry(&name, cv))
                .collect();

            if versions.is_empty() {
                debug!("No valid versions for chart {} in {}", name, url);
                continue;
            }

            // Every remaining version parses: checked by is_valid_entry
            versions.sort_by(|a, b| {
                let va = parse_version(&a.version).ok();
                let vb = parse_version(&b.version).ok();
                vb.cmp(&va)
            });
            entries.insert(name, versions);
        }

        Ok(Self {
            url: url.to_string(),
            entries,
        })
    }

    /// Returns all valid versions of `name`, newest first.
    pub fn versions(&self, name: &str) -> &[ChartVersion] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the newest valid version of `name`.
    pub fn latest(&self, name: &str) -> Result<String> {
        self.versions(name)
            .first()
            .map(|cv| cv.version.clone())
            .ok_or_else(|| ArtifactError::NotFound {
                kind: ArtifactType::Chart.to_string(),
                name: name.to_string(),
                detail: format!("no entries in index {}", self.url),
            })
    }
}

fn is_valid_entry(key: &str, cv: &ChartVersion) -> bool {
    cv.name == key
        && chart_name_re().is_match(&cv.name)
        && parse_version(&cv.version).is_ok()
        && cv.urls.iter().any(|u| !u.trim().is_empty())
}

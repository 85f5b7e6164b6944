//! Locators for chart packages.

use async_trait::async_trait;

use super::{ArtifactLocator, LocateContext, Location};
use crate::artifacts::error::Result;
use crate::artifacts::types::ArtifactType;

fn chart_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.tgz", name, version)
}

// ============================================================================
// Release-hosted charts
// ============================================================================

/// Chart published as a release asset, with a copy on the regional mirror.
///
/// - public: `{chart_release_base}/{name}-{version}/{name}-{version}.tgz`
/// - regional: `{region_base}/charts/{name}/{version}/{name}-{version}.tgz`
#[derive(Debug, Clone)]
pub struct ReleaseChartLocator {
    name: String,
}

impl ReleaseChartLocator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ArtifactLocator for ReleaseChartLocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArtifactType {
        ArtifactType::Chart
    }

    async fn discover_latest(&self, ctx: &LocateContext<'_>) -> Result<String> {
        ctx.discovery.fetch_chart_latest(&self.name).await
    }

    fn locate(&self, version: &str, from_region: bool, ctx: &LocateContext<'_>) -> Result<Location> {
        let endpoints = ctx.discovery.endpoints();
        let file_name = chart_file_name(&self.name, version);

        let url = if from_region {
            format!(
                "{}/{}/{}/{}/{}",
                endpoints.region_base.trim_end_matches('/'),
                ArtifactType::Chart.cache_segment(),
                self.name,
                version,
                file_name
            )
        } else {
            format!(
                "{}/{}-{}/{}",
                endpoints.chart_release_base.trim_end_matches('/'),
                self.name,
                version,
                file_name
            )
        };

        Ok(Location { file_name, url })
    }
}

// ============================================================================
// OCI-hosted charts
// ============================================================================

/// Chart pinned to a fixed OCI repository.
///
/// The URL is `{repository}/{name}` whatever the region flag says; the
/// version travels separately as the registry tag.
#[derive(Debug, Clone)]
pub struct OciChartLocator {
    name: String,
    repository: String,
}

impl OciChartLocator {
    /// `repository` is an `oci://host/path` prefix the chart name is appended to.
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
        }
    }
}

#[async_trait]
impl ArtifactLocator for OciChartLocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArtifactType {
        ArtifactType::Chart
    }

    async fn discover_latest(&self, ctx: &LocateContext<'_>) -> Result<String> {
        ctx.discovery.fetch_chart_latest(&self.name).await
    }

    fn locate(&self, version: &str, _from_region: bool, _ctx: &LocateContext<'_>) -> Result<Location> {
        Ok(Location {
            file_name: chart_file_name(&self.name, version),
            url: format!("{}/{}", self.repository.trim_end_matches('/'), self.name),
        })
    }
}

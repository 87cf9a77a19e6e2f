use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use skylift_backend::{
    Branch, EventSink, PatchEdge, PatchHost, ProbeOutcome, TransferError, TransferOutcome,
};

use crate::transfer::download_resumable;

/// Patch artifacts are published with this extension; cache files reuse it.
pub const PATCH_FILE_EXT: &str = "pwr";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the distribution lives. The patch base is the only required piece;
/// everything else refines it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Base URL patches are published under, for example
    /// `https://patches.example.com/patches/windows/amd64`.
    pub patch_base: String,

    /// Alternate base used when `use_mirror` is set.
    #[serde(default)]
    pub mirror_base: Option<String>,

    #[serde(default)]
    pub use_mirror: bool,

    /// JSON manifest describing the bundled Java runtime. Absent means the
    /// launcher falls back to a system Java.
    #[serde(default)]
    pub runtime_manifest_url: Option<String>,

    /// Override for the patcher tool archive; the default points at the
    /// public butler distribution.
    #[serde(default)]
    pub tool_archive_url: Option<String>,
}

impl DistributionConfig {
    #[must_use]
    pub fn new(patch_base: impl Into<String>) -> Self {
        Self {
            patch_base: patch_base.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_mirror(mut self, mirror_base: impl Into<String>) -> Self {
        self.mirror_base = Some(mirror_base.into());
        self
    }

    /// The base actually probed: the mirror substitutes for the primary
    /// wholesale when enabled and configured.
    #[must_use]
    pub fn active_base(&self) -> &str {
        if self.use_mirror
            && let Some(mirror) = &self.mirror_base
        {
            return mirror;
        }
        &self.patch_base
    }

    /// URL of the artifact that moves `branch` along `edge`.
    #[must_use]
    pub fn patch_url(&self, branch: &Branch, edge: PatchEdge) -> String {
        format!(
            "{}/{}/{}/{}.{PATCH_FILE_EXT}",
            self.active_base().trim_end_matches('/'),
            branch,
            edge.source,
            edge.target
        )
    }
}

/// [`PatchHost`] over plain HTTP. Probes are HEAD requests with a short
/// timeout; downloads go through the resumable transfer layer.
pub struct HttpPatchHost {
    client: reqwest::Client,
    config: DistributionConfig,
}

impl HttpPatchHost {
    /// Build a host around a fresh HTTP client.
    ///
    /// # Errors
    /// Returns an error when the underlying client cannot be constructed.
    pub fn new(config: DistributionConfig) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("skylift/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransferError::ClientBuild)?;
        Ok(Self::with_client(client, config))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, config: DistributionConfig) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn head_outcome(&self, url: &str) -> ProbeOutcome {
        let response = self
            .client
            .head(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let length = response
                    .headers()
                    .get(reqwest::header::CONTENT_LENGTH)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok());
                trace!("probe hit: {url} ({length:?} bytes)");
                ProbeOutcome::Present { length }
            }
            Ok(response) => {
                trace!("probe miss: {url} (HTTP {})", response.status());
                ProbeOutcome::Absent
            }
            Err(error) => {
                debug!("probe unreachable: {url}: {error}");
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[async_trait]
impl PatchHost for HttpPatchHost {
    async fn probe(&self, branch: &Branch, edge: PatchEdge) -> ProbeOutcome {
        let url = self.config.patch_url(branch, edge);
        self.head_outcome(&url).await
    }

    async fn fetch_patch(
        &self,
        branch: &Branch,
        edge: PatchEdge,
        dest: &Path,
        events: &EventSink,
    ) -> Result<TransferOutcome, TransferError> {
        let url = self.config.patch_url(branch, edge);
        // A fresh probe supplies the expected size; cache reuse and the
        // post-download check both key off it. A host that answers without
        // a length simply skips those checks.
        let expected_size = self.head_outcome(&url).await.length();
        download_resumable(&self.client, &url, dest, expected_size, events).await
    }
}

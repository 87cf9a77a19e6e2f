use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use skylift_backend::{EventSink, TransferError};

use crate::archive::{self, ArchiveError};
use crate::transfer::download_resumable;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("runtime manifest request to {url} failed: {source}")]
    Manifest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP {status} fetching runtime manifest from {url}")]
    ManifestStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("runtime manifest is invalid: {details}")]
    ManifestInvalid { details: String },

    #[error("no runtime build published for {os}/{arch}")]
    UnsupportedPlatform { os: &'static str, arch: &'static str },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("runtime archive checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("extracted runtime is missing {}", .path.display())]
    MissingBinary { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no bundled runtime configured and no java on PATH")]
    NoJava,
}

impl RuntimeError {
    /// True for failures a flaky network can cause; those fall back to a
    /// system java instead of aborting the launch.
    fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Manifest { .. } | Self::ManifestStatus { .. } | Self::Transfer(_)
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawRuntimeManifest {
    #[serde(default)]
    version: String,
    download_url: HashMap<String, HashMap<String, RawRuntimeArtifact>>,
}

#[derive(Debug, Deserialize)]
struct RawRuntimeArtifact {
    url: String,
    #[serde(default)]
    sha256: Option<String>,
}

/// Where the java binary sits inside a provisioned runtime directory.
#[must_use]
pub fn java_binary_in(runtime_dir: &Path) -> PathBuf {
    let binary = if cfg!(windows) { "java.exe" } else { "java" };
    runtime_dir.join("bin").join(binary)
}

/// Make a java binary available, preferring the bundled runtime under
/// `runtime_dir` and provisioning it from the manifest when absent.
///
/// A manifest or download failure degrades to whatever `java` is on PATH;
/// only when there is no fallback either does the original error surface.
///
/// # Errors
/// Fails when no runtime can be provisioned and no system java exists, or
/// when a provisioned archive is corrupt or incomplete.
pub async fn ensure_runtime(
    client: &reqwest::Client,
    manifest_url: Option<&str>,
    runtime_dir: &Path,
    events: &EventSink,
) -> Result<PathBuf, RuntimeError> {
    events.status("Checking Java...");

    let bundled = java_binary_in(runtime_dir);
    if bundled.is_file() {
        debug!("bundled runtime present at {}", bundled.display());
        return Ok(bundled);
    }

    let Some(url) = manifest_url else {
        return system_java(events).ok_or(RuntimeError::NoJava);
    };

    match provision_runtime(client, url, runtime_dir, events).await {
        Ok(java) => Ok(java),
        Err(error) if error.is_network() => {
            warn!("Runtime provisioning failed ({error}); checking PATH for java");
            system_java(events).ok_or(error)
        }
        Err(error) => Err(error),
    }
}

fn system_java(events: &EventSink) -> Option<PathBuf> {
    let java = which::which("java").ok()?;
    info!("Using system java at {}", java.display());
    events.status("Using system Java");
    Some(java)
}

async fn provision_runtime(
    client: &reqwest::Client,
    manifest_url: &str,
    runtime_dir: &Path,
    events: &EventSink,
) -> Result<PathBuf, RuntimeError> {
    let manifest = fetch_manifest(client, manifest_url).await?;
    let os = env::consts::OS;
    let arch = manifest_arch();
    let artifact = manifest
        .download_url
        .get(os)
        .and_then(|by_arch| by_arch.get(arch))
        .ok_or(RuntimeError::UnsupportedPlatform { os, arch })?;

    info!("Provisioning Java runtime {}", manifest.version);
    events.status("Downloading Java Runtime...");
    let archive_path = runtime_dir.with_extension("zip");
    if let Some(parent) = archive_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| RuntimeError::Io {
                context: "failed to create runtime parent directory",
                source: error,
            })?;
    }
    download_resumable(client, &artifact.url, &archive_path, None, events).await?;

    if let Some(expected) = &artifact.sha256 {
        let actual = archive::sha256_file(&archive_path)?;
        if !actual.eq_ignore_ascii_case(expected) {
            let _ = std::fs::remove_file(&archive_path);
            return Err(RuntimeError::ChecksumMismatch {
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }
    }

    events.status("Extracting Java...");
    tokio::fs::create_dir_all(runtime_dir)
        .await
        .map_err(|error| RuntimeError::Io {
            context: "failed to create runtime directory",
            source: error,
        })?;
    archive::extract_zip(&archive_path, runtime_dir)?;
    archive::flatten_single_dir(runtime_dir)?;
    let _ = tokio::fs::remove_file(&archive_path).await;

    let java = java_binary_in(runtime_dir);
    if java.is_file() {
        Ok(java)
    } else {
        Err(RuntimeError::MissingBinary { path: java })
    }
}

async fn fetch_manifest(
    client: &reqwest::Client,
    url: &str,
) -> Result<RawRuntimeManifest, RuntimeError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| RuntimeError::Manifest {
            url: url.to_string(),
            source: error,
        })?;

    if !response.status().is_success() {
        return Err(RuntimeError::ManifestStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    response
        .json::<RawRuntimeManifest>()
        .await
        .map_err(|error| RuntimeError::ManifestInvalid {
            details: error.to_string(),
        })
}

fn manifest_arch() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use skylift_backend::{
    Branch, EventSink, InstallState, PatchApplier, PatchEdge, PatchHost, PatchSet, PatcherError,
    TransferError, TransferOutcome, UpdatePlan, resolve,
};
use skylift_platform::LauncherPaths;

use crate::branch_lock::BranchLocks;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Patcher(#[from] PatcherError),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Reads the installed version from the marker file. A missing or mangled
/// marker reads as version 0, which makes every patch plan start from a
/// full install.
fn read_marker(path: &Path) -> u32 {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse().ok())
        .unwrap_or(0)
}

/// Replaces the marker atomically so a crash can never leave a half-written
/// version number behind.
fn write_marker(path: &Path, version: u32) -> Result<(), InstallError> {
    let parent = path.parent().ok_or_else(|| {
        InstallError::io(
            "failed to persist version marker",
            std::io::Error::other("marker path has no parent directory"),
        )
    })?;
    std::fs::create_dir_all(parent)
        .map_err(|error| InstallError::io("failed to create game directory", error))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|error| InstallError::io("failed to stage version marker", error))?;
    write!(temp, "{version}")
        .map_err(|error| InstallError::io("failed to write version marker", error))?;
    temp.persist(path)
        .map_err(|error| InstallError::io("failed to persist version marker", error.error))?;
    Ok(())
}

/// What is currently on disk for `branch`, from the marker and the client
/// binary.
#[must_use]
pub fn branch_state(paths: &LauncherPaths, branch: &Branch) -> InstallState {
    let marker = read_marker(&paths.version_marker(branch.as_str()));
    if marker == 0 {
        InstallState::NotInstalled
    } else if paths.client_binary(branch.as_str()).is_file() {
        InstallState::UpToDate(marker)
    } else {
        InstallState::PartiallyInstalled(marker)
    }
}

/// Drives a branch install from whatever is on disk to a target version.
///
/// The manager owns no patch graph of its own; callers hand it the snapshot
/// they discovered so repeated installs against one snapshot stay
/// consistent. The version marker on disk is the single source of truth for
/// progress, which is what makes interrupted installs resumable.
pub struct InstallationManager {
    host: Arc<dyn PatchHost>,
    applier: Box<dyn PatchApplier>,
    paths: LauncherPaths,
    locks: BranchLocks,
}

impl InstallationManager {
    #[must_use]
    pub fn new(
        host: Arc<dyn PatchHost>,
        applier: Box<dyn PatchApplier>,
        paths: LauncherPaths,
    ) -> Self {
        Self {
            host,
            applier,
            paths,
            locks: BranchLocks::new(),
        }
    }

    /// Brings `branch` to `target`, downloading and applying whatever the
    /// patch set requires. Safe to call again after any failure: the marker
    /// keeps the last fully applied version, so a retry resumes there
    /// instead of starting over.
    ///
    /// # Errors
    /// Returns the first transfer, patcher, or filesystem failure. The
    /// marker is only advanced after a patch has been applied completely.
    pub async fn install(
        &self,
        branch: &Branch,
        target: u32,
        patches: &PatchSet,
        events: &EventSink,
    ) -> Result<InstallState, InstallError> {
        let _guard = self
            .locks
            .acquire(branch, self.paths.branch_lock_file(branch.as_str()))
            .await
            .map_err(|error| InstallError::io("failed to lock branch for install", error))?;

        events.status("Checking game...");

        let marker_path = self.paths.version_marker(branch.as_str());
        let client_binary = self.paths.client_binary(branch.as_str());
        let installed = read_marker(&marker_path);

        if installed == target && client_binary.is_file() {
            info!("{branch}: version {target} is already installed");
            events.status("Game already installed");
            events.progress(100.0);
            return Ok(InstallState::UpToDate(installed));
        }

        let mut plan = resolve(installed, target, patches);
        if plan.is_empty() {
            if client_binary.is_file() {
                events.status("Game already installed");
                events.progress(100.0);
                return Ok(InstallState::UpToDate(installed));
            }
            // The marker claims a version but the client is gone. Repair by
            // reinstalling from scratch.
            warn!("{branch}: marker reads {installed} but the client binary is missing, reinstalling");
            plan = UpdatePlan::full_reinstall(target);
        }

        info!(
            "{branch}: updating {installed} -> {target} in {} step(s)",
            plan.len()
        );

        let game_dir = self.paths.game_dir(branch.as_str());
        for edge in plan {
            let artifact = self.fetch_edge(branch, edge, events).await?;
            self.applier.apply(&artifact, &game_dir, events).await?;
            write_marker(&marker_path, edge.target)?;
            debug!("{branch}: now at version {}", edge.target);
        }

        events.status("Game installed!");
        events.progress(100.0);
        Ok(InstallState::UpToDate(target))
    }

    /// Downloads the artifact for one edge into the shared cache, retrying
    /// once when the payload comes back truncated.
    async fn fetch_edge(
        &self,
        branch: &Branch,
        edge: PatchEdge,
        events: &EventSink,
    ) -> Result<PathBuf, InstallError> {
        let dest = self
            .paths
            .patch_cache_file(branch.as_str(), edge.source, edge.target);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| InstallError::io("failed to create cache directory", error))?;
        }

        if edge.is_full_install() {
            events.status(format!("Downloading version {}...", edge.target));
        } else {
            events.status(format!("Downloading patch {edge}..."));
        }

        let outcome = match self.host.fetch_patch(branch, edge, &dest, events).await {
            Ok(outcome) => outcome,
            Err(TransferError::SizeMismatch {
                expected, actual, ..
            }) => {
                warn!(
                    "{branch}: {edge} arrived with {actual} bytes, expected {expected}, retrying once"
                );
                events.status("File corrupted, re-downloading...");
                self.host.fetch_patch(branch, edge, &dest, events).await?
            }
            Err(error) => return Err(error.into()),
        };

        if matches!(outcome, TransferOutcome::Cached) {
            debug!("{branch}: {edge} served from cache");
            events.status("Patch file already downloaded");
        }
        Ok(dest)
    }
}

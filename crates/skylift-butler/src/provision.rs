use std::path::{Path, PathBuf};

use log::{debug, info};
use which::which;

use skylift_backend::{EventSink, PatcherError};
use skylift_core::{download_resumable, extract_zip};

const BINARY_NAME: &str = if cfg!(windows) { "butler.exe" } else { "butler" };

/// Make the butler binary available, in order of preference: an earlier
/// provisioned copy in `tool_dir`, a system-wide install on PATH, or a
/// fresh download of the official archive.
///
/// # Errors
/// Fails when the archive cannot be downloaded or does not extract to a
/// usable binary.
pub async fn ensure_installed(
    client: &reqwest::Client,
    tool_dir: &Path,
    archive_url: Option<&str>,
    events: &EventSink,
) -> Result<PathBuf, PatcherError> {
    let provisioned = tool_dir.join(BINARY_NAME);
    if provisioned.is_file() {
        debug!("butler already provisioned at {}", provisioned.display());
        return Ok(provisioned);
    }

    if let Ok(system) = which("butler") {
        info!("Using system butler at {}", system.display());
        return Ok(system);
    }

    let url = archive_url.map_or_else(default_archive_url, str::to_string);
    info!("Provisioning butler from {url}");
    events.status("Downloading Butler...");

    tokio::fs::create_dir_all(tool_dir)
        .await
        .map_err(|error| PatcherError::io("failed to create tool directory", error))?;
    let zip_path = tool_dir.join("butler.zip");
    download_resumable(client, &url, &zip_path, None, events).await?;

    events.status("Extracting Butler...");
    extract_zip(&zip_path, tool_dir)
        .map_err(|error| PatcherError::provision("extract", error.to_string()))?;
    let _ = tokio::fs::remove_file(&zip_path).await;

    if !provisioned.is_file() {
        return Err(PatcherError::provision(
            "extract",
            format!("archive did not contain {BINARY_NAME}"),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&provisioned, std::fs::Permissions::from_mode(0o755));
    }

    Ok(provisioned)
}

fn default_archive_url() -> String {
    let platform = match std::env::consts::OS {
        "windows" => "windows-amd64",
        "macos" => "darwin-amd64",
        _ => "linux-amd64",
    };
    format!("https://broth.itch.zone/butler/{platform}/LATEST/archive/default")
}

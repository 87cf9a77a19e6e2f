use std::path::PathBuf;

use log::info;
use thiserror::Error;
use tokio::process::{Child, Command};
use uuid::Uuid;

use skylift_backend::{Branch, EventSink};
use skylift_core::{RuntimeError, ensure_runtime};
use skylift_platform::{HideWindow, LauncherPaths};

use crate::config::LauncherConfig;

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("player name must be {MIN_NAME_LEN} to {MAX_NAME_LEN} characters")]
    InvalidName,

    #[error("game client not found at {}", .path.display())]
    ClientMissing { path: PathBuf },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Starts the game client for `branch` with an offline session.
///
/// Makes sure a Java runtime is available first, then spawns the client
/// detached from the launcher. The returned child is not awaited; dropping
/// it leaves the game running.
///
/// # Errors
/// Fails when the player name is out of range, the client binary is missing,
/// no Java runtime can be provisioned, or the process cannot be spawned.
pub async fn launch_game(
    client: &reqwest::Client,
    config: &LauncherConfig,
    paths: &LauncherPaths,
    branch: &Branch,
    player_name: &str,
    events: &EventSink,
) -> Result<Child, LaunchError> {
    let name_length = player_name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name_length) {
        return Err(LaunchError::InvalidName);
    }

    let client_binary = paths.client_binary(branch.as_str());
    if !client_binary.is_file() {
        return Err(LaunchError::ClientMissing {
            path: client_binary,
        });
    }

    let java = ensure_runtime(
        client,
        config.distribution.runtime_manifest_url.as_deref(),
        &paths.runtime_dir(),
        events,
    )
    .await?;

    events.status("Launching game...");
    let session = Uuid::new_v4();
    info!("{branch}: launching client as {player_name} (session {session})");

    let mut command = Command::new(&client_binary);
    command
        .current_dir(paths.client_dir(branch.as_str()))
        .arg("--app-dir")
        .arg(paths.game_dir(branch.as_str()))
        .arg("--java-exec")
        .arg(java)
        .arg("--auth-mode")
        .arg("offline")
        .arg("--uuid")
        .arg(session.to_string())
        .arg("--name")
        .arg(player_name)
        .hide_window();

    command.spawn().map_err(|error| LaunchError::Io {
        context: "failed to spawn game client",
        source: error,
    })
}

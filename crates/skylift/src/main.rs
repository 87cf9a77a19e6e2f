mod branch_lock;
mod config;
mod installer;
mod launch;
mod logging;

use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use skylift_backend::{
    Branch, EventSink, InstallEvent, InstallState, KNOWN_BRANCHES, PatchHost, PatchSet,
};
use skylift_butler::ButlerTool;
use skylift_core::{HttpPatchHost, PatchGraphBuilder};
use skylift_platform::LauncherPaths;

use crate::config::LauncherConfig;
use crate::installer::InstallationManager;

/// Downloads, patches, and launches the game.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Release channel to operate on (defaults to the configured branch)
    #[arg(short, long, global = true)]
    branch: Option<String>,

    /// Show debug output on the terminal
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the versions published for the branch
    Versions,
    /// Install or update the game (latest version when none is given)
    Install {
        /// Target version number
        version: Option<u32>,
    },
    /// Update to the latest version, then start the game
    Launch {
        /// Player name, 3 to 16 characters
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let Cli {
        branch,
        verbose,
        command,
    } = Cli::parse();

    let paths = match LauncherPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    };
    let config_file = paths.config_file();
    let config = LauncherConfig::load(&config_file);
    let paths = match config.install_root.clone() {
        Some(root) => paths.with_install_root(root),
        None => paths,
    };
    logging::init(
        &paths,
        verbose || config.debug_logging,
        config.max_log_size_bytes,
    );

    // First run: write the defaults out so there is a file to edit.
    if !config_file.exists()
        && let Err(error) = config.save(&config_file)
    {
        warn!(
            "Could not write default config to {}: {error}",
            config_file.display()
        );
    }

    let branch_name = branch.unwrap_or_else(|| config.branch.clone());
    if !KNOWN_BRANCHES.contains(&branch_name.as_str()) {
        warn!("{branch_name} is not a known release channel");
    }
    let branch = Branch::new(branch_name);

    let (events, receiver) = EventSink::channel();
    let printer = tokio::spawn(print_events(receiver));

    let result = run(command, &config, &paths, &branch, &events).await;

    drop(events);
    let _ = printer.await;

    match result {
        Ok(summary) => {
            if !summary.is_empty() {
                println!("{summary}");
            }
        }
        Err(error) => {
            error!("{error}");
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    }
}

/// Renders the event stream on stdout. Progress updates rewrite one line;
/// status changes get a line of their own.
async fn print_events(mut receiver: UnboundedReceiver<InstallEvent>) {
    let mut mid_progress = false;
    while let Some(event) = receiver.recv().await {
        match event {
            InstallEvent::Status(message) => {
                if mid_progress {
                    println!();
                    mid_progress = false;
                }
                println!("{message}");
            }
            InstallEvent::Progress(percent) => {
                print!("\r{percent:>6.1}%");
                let _ = std::io::stdout().flush();
                mid_progress = true;
            }
            InstallEvent::Indeterminate => {}
        }
    }
    if mid_progress {
        println!();
    }
}

async fn run(
    command: Commands,
    config: &LauncherConfig,
    paths: &LauncherPaths,
    branch: &Branch,
    events: &EventSink,
) -> Result<String, Box<dyn std::error::Error>> {
    match command {
        Commands::Versions => list_versions(config, paths, branch, events).await,
        Commands::Install { version } => install(version, config, paths, branch, events).await,
        Commands::Launch { name } => update_and_launch(name, config, paths, branch, events).await,
    }
}

async fn list_versions(
    config: &LauncherConfig,
    paths: &LauncherPaths,
    branch: &Branch,
    events: &EventSink,
) -> Result<String, Box<dyn std::error::Error>> {
    let host = HttpPatchHost::new(config.distribution.clone())?;
    let snapshot = PatchGraphBuilder::new(&host).discover(branch, events).await;

    let mut lines = Vec::new();
    for version in &snapshot.versions {
        if version.is_latest {
            lines.push(format!("{} (version {})", version.name, version.version));
        } else {
            lines.push(version.name.clone());
        }
    }
    lines.push(String::new());
    lines.push(match installer::branch_state(paths, branch) {
        InstallState::NotInstalled => format!("Nothing installed on {branch}"),
        InstallState::PartiallyInstalled(version) => {
            format!("Installed on {branch}: version {version} (client missing)")
        }
        InstallState::UpToDate(version) => format!("Installed on {branch}: version {version}"),
    });
    Ok(lines.join("\n"))
}

async fn install(
    requested: Option<u32>,
    config: &LauncherConfig,
    paths: &LauncherPaths,
    branch: &Branch,
    events: &EventSink,
) -> Result<String, Box<dyn std::error::Error>> {
    let host = Arc::new(HttpPatchHost::new(config.distribution.clone())?);
    let snapshot = PatchGraphBuilder::new(host.as_ref())
        .discover(branch, events)
        .await;

    let target = match requested {
        Some(version) => {
            let published = snapshot
                .versions
                .iter()
                .any(|entry| !entry.is_latest && entry.version == version);
            if !published {
                return Err(
                    format!("version {version} is not available on branch {branch}").into(),
                );
            }
            version
        }
        None => snapshot.latest().map_or(1, |latest| latest.version),
    };

    let state = run_install(
        &host,
        config,
        paths,
        branch,
        target,
        &snapshot.patches,
        events,
    )
    .await?;
    let version = match state {
        InstallState::UpToDate(version) | InstallState::PartiallyInstalled(version) => version,
        InstallState::NotInstalled => 0,
    };
    Ok(format!("{branch} is at version {version}"))
}

async fn update_and_launch(
    name: Option<String>,
    config: &LauncherConfig,
    paths: &LauncherPaths,
    branch: &Branch,
    events: &EventSink,
) -> Result<String, Box<dyn std::error::Error>> {
    let Some(player) = name.or_else(|| config.player_name.clone()) else {
        return Err("no player name given; pass --name or set player_name in the config".into());
    };

    let host = Arc::new(HttpPatchHost::new(config.distribution.clone())?);
    let snapshot = PatchGraphBuilder::new(host.as_ref())
        .discover(branch, events)
        .await;
    let target = snapshot.latest().map_or(1, |latest| latest.version);
    run_install(
        &host,
        config,
        paths,
        branch,
        target,
        &snapshot.patches,
        events,
    )
    .await?;

    let child = launch::launch_game(host.client(), config, paths, branch, &player, events).await?;
    Ok(match child.id() {
        Some(pid) => format!("Game running (pid {pid})"),
        None => "Game running".to_owned(),
    })
}

async fn run_install(
    host: &Arc<HttpPatchHost>,
    config: &LauncherConfig,
    paths: &LauncherPaths,
    branch: &Branch,
    target: u32,
    patches: &PatchSet,
    events: &EventSink,
) -> Result<InstallState, Box<dyn std::error::Error>> {
    let butler = skylift_butler::ensure_installed(
        host.client(),
        &paths.tool_dir(),
        config.distribution.tool_archive_url.as_deref(),
        events,
    )
    .await?;
    let applier = ButlerTool::new(butler, paths.patcher_log_file());
    let manager = InstallationManager::new(
        Arc::clone(host) as Arc<dyn PatchHost>,
        Box::new(applier),
        paths.clone(),
    );
    Ok(manager.install(branch, target, patches, events).await?)
}

use std::path::PathBuf;
use thiserror::Error;

#[cfg(windows)]
const CLIENT_BINARY_NAME: &str = "GameClient.exe";
#[cfg(not(windows))]
const CLIENT_BINARY_NAME: &str = "GameClient";

const VERSION_MARKER_NAME: &str = ".version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LauncherPathsError {
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

/// Filesystem layout for the launcher and the installs it manages.
///
/// The launcher directory holds everything the launcher owns outright (the
/// artifact cache, the patcher tool, the bundled runtime, logs). The install
/// root holds one game tree per branch; the patcher rewrites the game
/// directory inside it wholesale, so nothing the launcher needs to keep may
/// live in there except the version marker.
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    pub config_dir: PathBuf,
    pub launcher_dir: PathBuf,
    pub install_root: PathBuf,
}

impl LauncherPaths {
    /// Build launcher paths from the platform's standard directories.
    ///
    /// # Errors
    /// Returns an error when the user config or data directory cannot be
    /// determined.
    pub fn new() -> Result<Self, LauncherPathsError> {
        let config_dir = dirs::config_dir()
            .ok_or(LauncherPathsError::ConfigDirUnavailable)?
            .join("skylift");
        let launcher_dir = dirs::data_dir()
            .ok_or(LauncherPathsError::DataDirUnavailable)?
            .join("skylift");
        let install_root = launcher_dir.join("install");

        Ok(Self {
            config_dir,
            launcher_dir,
            install_root,
        })
    }

    #[must_use]
    pub fn with_install_root(mut self, root: PathBuf) -> Self {
        self.install_root = root;
        self
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.launcher_dir.join("skylift.log")
    }

    /// Diagnostic log of every external patcher invocation.
    #[must_use]
    pub fn patcher_log_file(&self) -> PathBuf {
        self.launcher_dir.join("butler.log")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.launcher_dir.join("cache")
    }

    /// Cache location for one patch artifact.
    #[must_use]
    pub fn patch_cache_file(&self, branch: &str, source: u32, target: u32) -> PathBuf {
        self.cache_dir()
            .join(format!("{branch}_{source}_{target}.pwr"))
    }

    /// Directory the patcher tool is provisioned into.
    #[must_use]
    pub fn tool_dir(&self) -> PathBuf {
        self.launcher_dir.join("butler")
    }

    /// Directory the bundled Java runtime is extracted into.
    #[must_use]
    pub fn runtime_dir(&self) -> PathBuf {
        self.launcher_dir.join("runtime")
    }

    /// The game tree for one branch. This is the directory patches are
    /// applied against.
    #[must_use]
    pub fn game_dir(&self, branch: &str) -> PathBuf {
        self.install_root
            .join(branch)
            .join("package")
            .join("game")
            .join("latest")
    }

    #[must_use]
    pub fn client_dir(&self, branch: &str) -> PathBuf {
        self.game_dir(branch).join("Client")
    }

    #[must_use]
    pub fn client_binary(&self, branch: &str) -> PathBuf {
        self.client_dir(branch).join(CLIENT_BINARY_NAME)
    }

    /// Persisted installed-version marker for one branch.
    #[must_use]
    pub fn version_marker(&self, branch: &str) -> PathBuf {
        self.game_dir(branch).join(VERSION_MARKER_NAME)
    }

    /// Advisory lock taken while installing into a branch. Lives above the
    /// game directory so the patcher cannot clobber it mid-apply.
    #[must_use]
    pub fn branch_lock_file(&self, branch: &str) -> PathBuf {
        self.install_root.join(branch).join("install.lock")
    }

    /// Ensure the launcher-owned directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.launcher_dir)?;
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(&self.install_root)?;
        Ok(())
    }
}

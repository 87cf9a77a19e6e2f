use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};
use skylift_core::DistributionConfig;

fn default_branch() -> String {
    "release".to_owned()
}

fn default_max_log_size() -> u64 {
    5 * 1024 * 1024
}

/// Launcher settings persisted as JSON in the config directory.
///
/// Every field has a default so a partial or missing file still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Overrides the install location under the launcher data directory.
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    /// Release channel used when none is given on the command line.
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub player_name: Option<String>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size")]
    pub max_log_size_bytes: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            distribution: DistributionConfig::default(),
            install_root: None,
            branch: default_branch(),
            player_name: None,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size(),
        }
    }
}

impl LauncherConfig {
    /// Reads the config file, falling back to defaults when it is missing or
    /// unparseable. A broken file never blocks startup.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                warn!(
                    "Config file {} is invalid, using defaults: {error}",
                    path.display()
                );
                Self::default()
            }),
            Err(error) => {
                warn!(
                    "Config file {} is unreadable, using defaults: {error}",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Writes the config through a temporary file in the same directory so a
    /// crash mid-write cannot leave a truncated config behind.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("config path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;

        let content = serde_json::to_string_pretty(self)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(content.as_bytes())?;
        temp.persist(path).map_err(|error| error.error)?;
        Ok(())
    }
}

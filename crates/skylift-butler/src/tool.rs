use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use skylift_backend::{EventSink, PatchApplier, PatcherError};
use skylift_platform::HideWindow;

/// Hard wall-clock limit on a single apply run. Anything still going after
/// this is assumed wedged and gets killed.
const APPLY_TIMEOUT: Duration = Duration::from_secs(600);

const STAGING_DIR_NAME: &str = "staging-temp";

/// Drives the butler binary over its command-line contract:
/// `butler apply --staging-dir <scratch> <patchFile> <targetDir>`.
///
/// Every invocation is appended to a diagnostic log, including its full
/// captured output, so failed applies can be inspected after the fact.
pub struct ButlerTool {
    binary: PathBuf,
    log_path: PathBuf,
    timeout: Duration,
}

impl ButlerTool {
    #[must_use]
    pub fn new(binary: PathBuf, log_path: PathBuf) -> Self {
        Self {
            binary,
            log_path,
            timeout: APPLY_TIMEOUT,
        }
    }

    /// Shorter limit for tests; production keeps the default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn append_log(&self, patch_file: &Path, target_dir: &Path, outcome: &str) {
        let record = format!(
            "[{}] {} apply --staging-dir {} {} {}\n{outcome}\n\n",
            chrono::Local::now().to_rfc3339(),
            self.binary.display(),
            target_dir.join(STAGING_DIR_NAME).display(),
            patch_file.display(),
            target_dir.display(),
        );

        let result = async {
            if let Some(parent) = self.log_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.log_path)
                .await?;
            file.write_all(record.as_bytes()).await
        }
        .await;

        if let Err(error) = result {
            warn!("Failed to append patcher log: {error}");
        }
    }
}

#[async_trait]
impl PatchApplier for ButlerTool {
    async fn apply(
        &self,
        patch_file: &Path,
        target_dir: &Path,
        events: &EventSink,
    ) -> Result<(), PatcherError> {
        events.status("Applying patch...");
        events.indeterminate();

        let staging = target_dir.join(STAGING_DIR_NAME);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|error| PatcherError::io("failed to create staging directory", error))?;

        debug!(
            "applying {} to {} via {}",
            patch_file.display(),
            target_dir.display(),
            self.binary.display()
        );

        let mut command = Command::new(&self.binary);
        command
            .arg("apply")
            .arg("--staging-dir")
            .arg(&staging)
            .arg(patch_file)
            .arg(target_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .hide_window();

        // kill_on_drop reaps the child when the timeout drops the future.
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => {
                result.map_err(|error| PatcherError::io("failed to launch patcher", error))?
            }
            Err(_) => {
                let seconds = self.timeout.as_secs();
                self.append_log(patch_file, target_dir, &format!("killed after {seconds}s"))
                    .await;
                return Err(PatcherError::Timeout { seconds });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit = output
            .status
            .code()
            .map_or_else(|| "terminated by signal".to_string(), |code| code.to_string());
        self.append_log(
            patch_file,
            target_dir,
            &format!("exit: {exit}\nstdout:\n{stdout}stderr:\n{stderr}"),
        )
        .await;

        if !output.status.success() {
            let details = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            return Err(PatcherError::Failed {
                code: output.status.code().unwrap_or(-1),
                output: details.trim().to_string(),
            });
        }

        if let Err(error) = tokio::fs::remove_dir_all(&staging).await {
            warn!("Failed to remove staging directory: {error}");
        }
        Ok(())
    }
}

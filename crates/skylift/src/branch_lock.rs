use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use log::debug;
use skylift_backend::Branch;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes installs per branch. The async mutex queues tasks inside this
/// process; the advisory file lock extends the exclusion to other launcher
/// processes sharing the same install root.
#[derive(Default)]
pub struct BranchLocks {
    guards: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one install. Both layers release on drop.
pub struct BranchGuard {
    _permit: OwnedMutexGuard<()>,
    _file: File,
}

impl BranchLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the install guard for `branch`, waiting behind any install
    /// already in flight.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be created or locked.
    pub async fn acquire(
        &self,
        branch: &Branch,
        lock_path: PathBuf,
    ) -> Result<BranchGuard, std::io::Error> {
        let mutex = {
            let mut guards = self
                .guards
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(guards.entry(branch.as_str().to_owned()).or_default())
        };
        let permit = mutex.lock_owned().await;
        debug!("{branch}: install guard acquired in-process");

        // lock_exclusive blocks until any other process releases the branch,
        // so it runs on the blocking pool.
        let file = tokio::task::spawn_blocking(move || {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut lock_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            lock_file.lock_exclusive()?;
            lock_file
                .set_len(0)
                .and_then(|()| lock_file.seek(SeekFrom::Start(0)).map(|_| ()))
                .and_then(|()| writeln!(lock_file, "{}", std::process::id()))?;
            Ok::<File, std::io::Error>(lock_file)
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(BranchGuard {
            _permit: permit,
            _file: file,
        })
    }
}

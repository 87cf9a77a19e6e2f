use async_trait::async_trait;
use std::path::Path;

use crate::error::{PatcherError, TransferError};
use crate::events::EventSink;
use crate::types::{Branch, PatchEdge, ProbeOutcome, TransferOutcome};

/// Access to the patch distribution host. Implementations answer existence
/// probes and move artifacts into local files; they never interpret the
/// patch graph themselves.
#[async_trait]
pub trait PatchHost: Send + Sync {
    /// Check whether the artifact for `edge` is published on `branch`.
    /// Transport failures are reported as [`ProbeOutcome::Unreachable`],
    /// never as errors.
    async fn probe(&self, branch: &Branch, edge: PatchEdge) -> ProbeOutcome;

    /// Fetch the artifact for `edge` into `dest`, reusing cached or partial
    /// data where the transfer layer allows it.
    async fn fetch_patch(
        &self,
        branch: &Branch,
        edge: PatchEdge,
        dest: &Path,
        events: &EventSink,
    ) -> Result<TransferOutcome, TransferError>;
}

/// Applies a downloaded patch artifact to an install directory by driving
/// the external patcher tool.
#[async_trait]
pub trait PatchApplier: Send + Sync {
    async fn apply(
        &self,
        patch_file: &Path,
        target_dir: &Path,
        events: &EventSink,
    ) -> Result<(), PatcherError>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    struct FixedHost {
        published: HashSet<(u32, u32)>,
    }

    #[async_trait]
    impl PatchHost for FixedHost {
        async fn probe(&self, _branch: &Branch, edge: PatchEdge) -> ProbeOutcome {
            if self.published.contains(&(edge.source, edge.target)) {
                ProbeOutcome::Present { length: Some(16) }
            } else {
                ProbeOutcome::Absent
            }
        }

        async fn fetch_patch(
            &self,
            _branch: &Branch,
            _edge: PatchEdge,
            dest: &Path,
            events: &EventSink,
        ) -> Result<TransferOutcome, TransferError> {
            std::fs::write(dest, b"fake patch bytes")
                .map_err(|source| TransferError::io("failed to write artifact", source))?;
            events.progress(100.0);
            Ok(TransferOutcome::Downloaded { bytes: 16 })
        }
    }

    #[tokio::test]
    async fn trait_objects_probe_and_fetch() {
        let host: Arc<dyn PatchHost> = Arc::new(FixedHost {
            published: HashSet::from([(0, 1)]),
        });
        let branch = Branch::new("release");

        assert!(host.probe(&branch, PatchEdge::new(0, 1)).await.is_present());
        assert!(!host.probe(&branch, PatchEdge::new(0, 2)).await.is_present());

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let dest = temp.path().join("release_0_1.pwr");
        let outcome = host
            .fetch_patch(&branch, PatchEdge::new(0, 1), &dest, &EventSink::disabled())
            .await
            .expect("fetch should succeed");

        assert_eq!(outcome, TransferOutcome::Downloaded { bytes: 16 });
        assert!(dest.exists());
    }
}

//! Network-facing engine for the Skylift launcher.
//!
//! This crate implements everything that talks to the distribution host:
//! - Endpoint probing and artifact downloads over HTTP.
//! - Patch-graph discovery by systematic probing.
//! - Resumable, integrity-checked transfers with a local artifact cache.
//! - Bundled Java runtime provisioning for the game client.

mod archive;
mod discovery;
mod host;
mod runtime;
mod transfer;

/// Zip extraction and digest helpers shared by runtime and tool provisioning.
pub use archive::{ArchiveError, extract_zip, flatten_single_dir, sha256_file};
/// Patch-graph discovery over any [`skylift_backend::PatchHost`].
pub use discovery::{BranchSnapshot, PatchGraphBuilder};
/// HTTP implementation of the patch host plus its endpoint configuration.
pub use host::{DistributionConfig, HttpPatchHost, PATCH_FILE_EXT};
/// Java runtime manifest model and provisioning helper.
pub use runtime::{RuntimeError, ensure_runtime, java_binary_in};
/// Low-level resumable download primitive.
pub use transfer::download_resumable;

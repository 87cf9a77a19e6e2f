mod error;
mod events;
mod plan;
mod traits;
mod types;

pub use error::{PatcherError, TransferError};
pub use events::{EventSink, InstallEvent};
pub use plan::resolve;
pub use traits::{PatchApplier, PatchHost};
pub use types::{
    Branch, GameVersion, InstallState, KNOWN_BRANCHES, PatchEdge, PatchSet, ProbeOutcome,
    TransferOutcome, UpdatePlan,
};

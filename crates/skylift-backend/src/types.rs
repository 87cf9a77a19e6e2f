use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Release channels the distribution is known to publish. The type itself is
/// open: any identifier the host serves under is a valid branch.
pub const KNOWN_BRANCHES: [&str; 4] = ["release", "pre-release", "beta", "alpha"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Branch(String);

impl Branch {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Branch {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A single patch artifact: applying it moves an install from `source` to
/// `target`. `source == 0` denotes a full install from nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchEdge {
    pub source: u32,
    pub target: u32,
}

impl PatchEdge {
    #[must_use]
    pub fn new(source: u32, target: u32) -> Self {
        Self { source, target }
    }

    #[must_use]
    pub fn is_full_install(&self) -> bool {
        self.source == 0
    }
}

impl fmt::Display for PatchEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// The set of patch edges discovered for one branch. Insertion rejects edges
/// that do not move forward, so every held edge satisfies `target > source`
/// and no (source, target) pair appears twice.
///
/// A snapshot is built once per discovery run and replaced wholesale; it is
/// never mutated while plans are being resolved against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    edges: BTreeSet<PatchEdge>,
}

impl PatchSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered edge. Returns false for edges that would violate
    /// the forward-only rule or that are already present.
    pub fn insert(&mut self, edge: PatchEdge) -> bool {
        if edge.target <= edge.source {
            return false;
        }
        self.edges.insert(edge)
    }

    #[must_use]
    pub fn contains(&self, edge: PatchEdge) -> bool {
        self.edges.contains(&edge)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatchEdge> {
        self.edges.iter()
    }

    /// Highest version any edge reaches, if the set is non-empty.
    #[must_use]
    pub fn highest_target(&self) -> Option<u32> {
        self.edges.iter().map(|edge| edge.target).max()
    }

    /// Best next hop from `frontier`: the edge starting there that reaches
    /// the furthest without exceeding `limit`.
    #[must_use]
    pub fn furthest_from(&self, frontier: u32, limit: u32) -> Option<PatchEdge> {
        self.edges
            .iter()
            .filter(|edge| edge.source == frontier && edge.target <= limit)
            .max_by_key(|edge| edge.target)
            .copied()
    }
}

impl FromIterator<PatchEdge> for PatchSet {
    fn from_iter<I: IntoIterator<Item = PatchEdge>>(iter: I) -> Self {
        let mut set = Self::new();
        for edge in iter {
            set.insert(edge);
        }
        set
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a PatchEdge;
    type IntoIter = std::collections::btree_set::Iter<'a, PatchEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

/// A version as offered to the user. The display edge always points at a
/// full install; the actual path is resolved when installing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersion {
    pub name: String,
    pub branch: Branch,
    pub source: u32,
    pub version: u32,
    pub is_latest: bool,
}

impl GameVersion {
    #[must_use]
    pub fn is_full_install(&self) -> bool {
        self.source == 0
    }
}

/// Ordered patch applications that take an install from its current version
/// to a requested one. Empty means the install is already at or past the
/// target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    edges: Vec<PatchEdge>,
}

impl UpdatePlan {
    #[must_use]
    pub fn new(edges: Vec<PatchEdge>) -> Self {
        Self { edges }
    }

    /// The wipe-and-reinstall fallback: one full-install edge to `target`.
    #[must_use]
    pub fn full_reinstall(target: u32) -> Self {
        Self {
            edges: vec![PatchEdge::new(0, target)],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn edges(&self) -> &[PatchEdge] {
        &self.edges
    }
}

impl IntoIterator for UpdatePlan {
    type Item = PatchEdge;
    type IntoIter = std::vec::IntoIter<PatchEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.into_iter()
    }
}

/// Result of probing a single patch endpoint. Absent means the host answered
/// and the artifact is not there; Unreachable means the request itself
/// failed. Discovery treats both as misses, but callers that care about host
/// health can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Present { length: Option<u64> },
    Absent,
    Unreachable,
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_present(self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Content length reported by the host, when it was present and sized.
    #[must_use]
    pub fn length(self) -> Option<u64> {
        match self {
            Self::Present { length } => length,
            Self::Absent | Self::Unreachable => None,
        }
    }
}

/// How a fetch was satisfied: from the local artifact cache, or by actually
/// transferring bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Cached,
    Downloaded { bytes: u64 },
}

/// Installation state of one branch, derived from the persisted version
/// marker and the presence of the client binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    PartiallyInstalled(u32),
    UpToDate(u32),
}

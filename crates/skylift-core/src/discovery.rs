use std::collections::BTreeSet;

use futures_util::stream::{self, StreamExt};
use log::{debug, info};

use skylift_backend::{Branch, EventSink, GameVersion, PatchEdge, PatchHost, PatchSet};

/// Probing stops once this many endpoints in a row come back missing.
const CONSECUTIVE_MISS_LIMIT: u32 = 5;

/// How many incremental lanes probe at once.
const LANE_CONCURRENCY: usize = 4;

/// Immutable result of one discovery run. Plans are resolved against the
/// snapshot, never against live shared state, so a snapshot stays valid for
/// as long as the caller keeps it.
#[derive(Debug, Clone)]
pub struct BranchSnapshot {
    pub branch: Branch,
    pub patches: PatchSet,
    pub versions: Vec<GameVersion>,
}

impl BranchSnapshot {
    /// The synthetic entry tracking the newest discovered version.
    #[must_use]
    pub fn latest(&self) -> Option<&GameVersion> {
        self.versions.iter().find(|version| version.is_latest)
    }
}

/// Discovers the patch graph of a branch by probing candidate endpoints.
/// The host tells us nothing up front; the scan is bounded by cutting off
/// after [`CONSECUTIVE_MISS_LIMIT`] misses in a row.
pub struct PatchGraphBuilder<'a, H: ?Sized> {
    host: &'a H,
    miss_limit: u32,
}

impl<'a, H: PatchHost + ?Sized> PatchGraphBuilder<'a, H> {
    #[must_use]
    pub fn new(host: &'a H) -> Self {
        Self {
            host,
            miss_limit: CONSECUTIVE_MISS_LIMIT,
        }
    }

    /// Tighten the consecutive-miss cutoff. Scan cost scales with it, so
    /// tests use a small limit to keep probe counts down.
    #[must_use]
    pub fn with_miss_limit(mut self, miss_limit: u32) -> Self {
        self.miss_limit = miss_limit.max(1);
        self
    }

    /// Probe out the patch graph for `branch` and derive the version list.
    ///
    /// Discovery never fails: an unreachable endpoint counts as a miss the
    /// same as a confirmed absence, and a channel where nothing is found
    /// yields the single-version fallback snapshot.
    pub async fn discover(&self, branch: &Branch, events: &EventSink) -> BranchSnapshot {
        events.status("Checking available versions...");
        events.progress(0.0);

        let mut patches = PatchSet::new();

        // Full installs first; the highest hit bounds the rest of the scan.
        let mut max_full = 0;
        let mut misses = 0;
        let mut version = 1;
        while misses < self.miss_limit {
            let edge = PatchEdge::new(0, version);
            if self.host.probe(branch, edge).await.is_present() {
                patches.insert(edge);
                max_full = version;
                misses = 0;
            } else {
                misses += 1;
            }
            events.progress(f64::from((version * 5).min(50)));
            version += 1;
        }
        debug!("{branch}: full installs reach version {max_full}");

        // One lane per base version, probing targets past it. A lane keeps
        // its own miss counter, so running several at once cannot cut any
        // of them short. Targets may overshoot the last known full build a
        // little; patches are sometimes published ahead of it.
        let overshoot_cap = max_full + self.miss_limit;
        let mut lanes =
            stream::iter((1..max_full).map(|base| self.scan_lane(branch, base, overshoot_cap)))
                .buffer_unordered(LANE_CONCURRENCY);

        let mut finished = 0;
        while let Some(found) = lanes.next().await {
            for edge in found {
                patches.insert(edge);
            }
            finished += 1;
            events.progress(50.0 + f64::from(finished) / f64::from(max_full) * 50.0);
        }

        events.progress(100.0);
        info!("{branch}: discovered {} patch edges", patches.len());

        let versions = derive_versions(branch, &patches);
        BranchSnapshot {
            branch: branch.clone(),
            patches,
            versions,
        }
    }

    async fn scan_lane(&self, branch: &Branch, base: u32, cap: u32) -> Vec<PatchEdge> {
        let mut found = Vec::new();
        let mut misses = 0;
        let mut target = base + 1;
        while misses < self.miss_limit && target <= cap {
            let edge = PatchEdge::new(base, target);
            if self.host.probe(branch, edge).await.is_present() {
                found.push(edge);
                misses = 0;
            } else {
                misses += 1;
            }
            target += 1;
        }
        found
    }
}

fn derive_versions(branch: &Branch, patches: &PatchSet) -> Vec<GameVersion> {
    let targets: BTreeSet<u32> = patches.iter().map(|edge| edge.target).collect();

    let Some(&highest) = targets.last() else {
        // Nothing discovered at all. Offer a single latest entry so a fresh
        // channel still resolves to a full install attempt.
        return vec![GameVersion {
            name: "Latest".to_string(),
            branch: branch.clone(),
            source: 0,
            version: 1,
            is_latest: true,
        }];
    };

    let mut versions = Vec::with_capacity(targets.len() + 1);
    versions.push(GameVersion {
        name: "Latest".to_string(),
        branch: branch.clone(),
        source: 0,
        version: highest,
        is_latest: true,
    });
    for target in targets {
        versions.push(GameVersion {
            name: format!("Version {target}"),
            branch: branch.clone(),
            source: 0,
            version: target,
            is_latest: false,
        });
    }
    versions
}

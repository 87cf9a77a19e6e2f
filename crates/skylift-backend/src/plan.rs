use crate::types::{PatchEdge, PatchSet, UpdatePlan};

/// Resolve the chain of patches that takes `installed` to `target` over the
/// discovered edge set.
///
/// The walk is greedy: a direct edge wins outright, otherwise each step takes
/// the edge from the current frontier that reaches furthest without passing
/// `target`. When the frontier dead-ends the partial chain is discarded and
/// the plan degrades to a single full install of `target`. The result is
/// deterministic for a given set and always terminates, because every chosen
/// edge strictly advances the frontier.
#[must_use]
pub fn resolve(installed: u32, target: u32, patches: &PatchSet) -> UpdatePlan {
    if installed >= target {
        return UpdatePlan::default();
    }

    let direct = PatchEdge::new(installed, target);
    if patches.contains(direct) {
        return UpdatePlan::new(vec![direct]);
    }

    let mut edges = Vec::new();
    let mut frontier = installed;
    while frontier != target {
        let Some(next) = patches.furthest_from(frontier, target) else {
            return UpdatePlan::full_reinstall(target);
        };
        edges.push(next);
        frontier = next.target;
    }

    UpdatePlan::new(edges)
}

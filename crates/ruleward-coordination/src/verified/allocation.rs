//! ID selection within a feature range.
//!
//! State is the pair (active set, free list). All planners take the current
//! state by reference and return the next state; nothing is mutated in place
//! so a failed plan leaves the caller's copy untouched.

use std::collections::BTreeSet;

use ruleward_rules::RuleId;

use crate::registry::IdRange;

/// Bookkeeping for one feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureIdState {
    /// IDs currently installed by the feature.
    pub active: BTreeSet<RuleId>,
    /// Previously used IDs available for reuse, most recently released last.
    pub free: Vec<RuleId>,
}

impl FeatureIdState {
    pub fn new(active: impl IntoIterator<Item = RuleId>, free: Vec<RuleId>) -> Self {
        Self {
            active: active.into_iter().collect(),
            free,
        }
    }
}

/// Successful allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Newly allocated IDs, ascending.
    pub ids: Vec<RuleId>,
    /// State after the allocation.
    pub state: FeatureIdState,
}

/// Pick `count` IDs from `range`.
///
/// Free-list entries are taken most recent first; entries that are out of
/// range or already active are discarded on the way. The remainder is found
/// by scanning upward from `range.start`. Either all `count` IDs are found or
/// `Err(available)` reports how many could have been.
pub fn plan_allocation(range: IdRange, state: &FeatureIdState, count: usize) -> Result<AllocationPlan, usize> {
    let mut free = state.free.clone();
    let mut picked: BTreeSet<RuleId> = BTreeSet::new();

    while picked.len() < count {
        let Some(id) = free.pop() else { break };
        if range.contains(id) && !state.active.contains(&id) {
            picked.insert(id);
        }
    }

    if picked.len() < count {
        let mut candidate = u64::from(range.start);
        let end = u64::from(range.end);
        while picked.len() < count && candidate <= end {
            let id = candidate as RuleId;
            if !state.active.contains(&id) && !picked.contains(&id) {
                picked.insert(id);
            }
            candidate = candidate.saturating_add(1);
        }
    }

    if picked.len() < count {
        return Err(picked.len());
    }

    let mut active = state.active.clone();
    active.extend(picked.iter().copied());
    free.retain(|id| !active.contains(id));

    Ok(AllocationPlan {
        ids: picked.into_iter().collect(),
        state: FeatureIdState { active, free },
    })
}

/// Outcome of releasing IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePlan {
    pub state: FeatureIdState,
    /// In-range IDs moved to the free list.
    pub released: Vec<RuleId>,
    /// Out-of-range IDs that were ignored.
    pub ignored: Vec<RuleId>,
}

/// Move in-range `ids` from the active set to the end of the free list.
///
/// Out-of-range IDs are reported in `ignored` and leave the state untouched.
/// An ID already on the free list is not added twice.
pub fn plan_release(range: IdRange, state: &FeatureIdState, ids: &[RuleId]) -> ReleasePlan {
    let mut next = state.clone();
    let mut released = Vec::new();
    let mut ignored = Vec::new();
    let mut seen: BTreeSet<RuleId> = BTreeSet::new();

    for &id in ids {
        if !seen.insert(id) {
            continue;
        }
        if !range.contains(id) {
            ignored.push(id);
            continue;
        }
        next.active.remove(&id);
        if !next.free.contains(&id) {
            next.free.push(id);
        }
        released.push(id);
    }

    ReleasePlan {
        state: next,
        released,
        ignored,
    }
}

/// Replace the active set with `ids`.
///
/// `Err(id)` names the first ID outside `range`. On success the new active
/// IDs are removed from the free list so the two stay disjoint.
pub fn plan_set_active(range: IdRange, state: &FeatureIdState, ids: &[RuleId]) -> Result<FeatureIdState, RuleId> {
    if let Some(&bad) = ids.iter().find(|id| !range.contains(**id)) {
        return Err(bad);
    }
    let active: BTreeSet<RuleId> = ids.iter().copied().collect();
    let free = state.free.iter().copied().filter(|id| !active.contains(id)).collect();
    Ok(FeatureIdState { active, free })
}

/// Inconsistencies `check_state` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    ActiveOutOfRange(RuleId),
    FreeOutOfRange(RuleId),
    FreeAlsoActive(RuleId),
    DuplicateFree(RuleId),
}

/// Every way `state` breaks the range and disjointness invariants.
pub fn check_state(range: IdRange, state: &FeatureIdState) -> Vec<StateViolation> {
    let mut violations: Vec<StateViolation> = state
        .active
        .iter()
        .filter(|id| !range.contains(**id))
        .map(|id| StateViolation::ActiveOutOfRange(*id))
        .collect();

    let mut seen: BTreeSet<RuleId> = BTreeSet::new();
    for &id in &state.free {
        if !seen.insert(id) {
            violations.push(StateViolation::DuplicateFree(id));
            continue;
        }
        if !range.contains(id) {
            violations.push(StateViolation::FreeOutOfRange(id));
        }
        if state.active.contains(&id) {
            violations.push(StateViolation::FreeAlsoActive(id));
        }
    }
    violations
}

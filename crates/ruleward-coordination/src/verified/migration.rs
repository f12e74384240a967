//! Pure steps of the bad-ID migration pass.

use std::collections::BTreeSet;

use ruleward_rules::host_from_url_filter;
use ruleward_rules::Rule;
use ruleward_rules::RuleId;

use crate::feature::Feature;
use crate::registry::RangeRegistry;
use crate::types::HostIndex;

/// A feature's installed rules split by whether their ID is in its range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPartition {
    pub good: Vec<Rule>,
    pub bad: Vec<Rule>,
    /// IDs inside the range held by rules another feature owns.
    pub foreign: BTreeSet<RuleId>,
}

impl MigrationPartition {
    pub fn good_ids(&self) -> BTreeSet<RuleId> {
        self.good.iter().map(|rule| rule.id).collect()
    }

    /// Every ID the feature owns on the host, good or bad.
    pub fn owned_ids(&self) -> BTreeSet<RuleId> {
        self.good.iter().chain(&self.bad).map(|rule| rule.id).collect()
    }
}

/// Select the rules `feature` owns from `installed` and split them.
///
/// Ownership follows [`RangeRegistry::owns`]. Good rules keep their relative
/// order, as do bad ones. In-range IDs of rules owned elsewhere are collected
/// as `foreign` so no new rule is placed on top of them.
pub fn partition_owned_rules(registry: &RangeRegistry, feature: Feature, installed: &[Rule]) -> MigrationPartition {
    let Ok(range) = registry.range_for(feature) else {
        return MigrationPartition::default();
    };

    let mut partition = MigrationPartition::default();
    for rule in installed {
        match (registry.owns(feature, rule), range.contains(rule.id)) {
            (true, true) => partition.good.push(rule.clone()),
            (true, false) => partition.bad.push(rule.clone()),
            (false, true) => {
                partition.foreign.insert(rule.id);
            }
            (false, false) => {}
        }
    }
    partition
}

/// Host index after moving each `(old rule, new id)` pair.
///
/// Entries pointing at neither a good ID nor a moved rule are dropped first,
/// so no host can end up naming an ID that was never installed for it. A
/// moved rule with no index entry gets one when its url filter names a host.
pub fn rebuild_host_index(index: &HostIndex, good_ids: &BTreeSet<RuleId>, moves: &[(Rule, RuleId)]) -> HostIndex {
    let moved_ids: BTreeSet<RuleId> = moves.iter().map(|(rule, _)| rule.id).collect();
    let mut next: HostIndex = index
        .iter()
        .filter(|(_, id)| good_ids.contains(id) || moved_ids.contains(id))
        .map(|(host, id)| (host.clone(), *id))
        .collect();

    for (rule, new_id) in moves {
        let mut repointed = false;
        for id in next.values_mut() {
            if *id == rule.id {
                *id = *new_id;
                repointed = true;
            }
        }
        if repointed {
            continue;
        }
        if let Some(host) = rule.condition.url_filter.as_deref().and_then(host_from_url_filter) {
            next.insert(host, *new_id);
        }
    }
    next
}

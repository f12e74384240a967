//! Moves a feature's rules out of IDs that do not belong to it.
//!
//! Rules installed before ranges existed may sit at low IDs or inside another
//! feature's range. The pass re-installs each of them under a fresh ID from
//! the owning feature's range in a single host update, then rebuilds the
//! feature's active set and host index to match.

use std::collections::BTreeSet;
use std::sync::Arc;

use ruleward_kv::KeyValueStore;
use ruleward_rules::Rule;
use ruleward_rules::RuleEngine;
use ruleward_rules::RuleId;
use ruleward_rules::UpdateRuleOptions;
use tracing::info;

use crate::allocator::range_exhausted;
use crate::commit::RuleCommitter;
use crate::error::RuleIdError;
use crate::feature::Feature;
use crate::types::HostIndex;
use crate::verified::partition_owned_rules;
use crate::verified::plan_allocation;
use crate::verified::rebuild_host_index;
use crate::verified::FeatureIdState;

/// One rule moved to a new ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigratedRule {
    pub from: RuleId,
    pub to: RuleId,
}

/// Result of a migration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Host index to persist for the feature.
    pub index: HostIndex,
    /// Rules that changed ID, in installation order.
    pub migrated: Vec<MigratedRule>,
    /// IDs already in range, left untouched.
    pub retained: Vec<RuleId>,
}

impl MigrationOutcome {
    /// The feature's active set after the pass, ascending.
    pub fn active_ids(&self) -> Vec<RuleId> {
        let ids: BTreeSet<RuleId> =
            self.retained.iter().copied().chain(self.migrated.iter().map(|moved| moved.to)).collect();
        ids.into_iter().collect()
    }
}

/// Runs the migration pass for one feature at a time.
pub struct RuleMigrator<S, H>
where
    S: KeyValueStore + ?Sized + 'static,
    H: RuleEngine + ?Sized,
{
    committer: Arc<RuleCommitter<S, H>>,
}

impl<S, H> RuleMigrator<S, H>
where
    S: KeyValueStore + ?Sized + 'static,
    H: RuleEngine + ?Sized,
{
    pub fn new(committer: Arc<RuleCommitter<S, H>>) -> Self {
        Self { committer }
    }

    /// Re-home `feature`'s out-of-range rules among `installed`.
    ///
    /// `index` is the feature's current host index; the returned outcome
    /// carries the index to persist. Runs under one lock hold. If the host
    /// rejects the update, nothing is persisted and the error is returned.
    pub async fn migrate_bad_ids(
        &self,
        feature: Feature,
        installed: &[Rule],
        index: &HostIndex,
    ) -> Result<MigrationOutcome, RuleIdError> {
        let allocator = self.committer.allocator();
        allocator.lock().with_lock(|| self.migrate_bad_ids_locked(feature, installed, index)).await
    }

    pub(crate) async fn migrate_bad_ids_locked(
        &self,
        feature: Feature,
        installed: &[Rule],
        index: &HostIndex,
    ) -> Result<MigrationOutcome, RuleIdError> {
        let allocator = self.committer.allocator();
        let registry = allocator.registry();
        let range = registry.range_for(feature)?;

        let partition = partition_owned_rules(registry, feature, installed);
        let good_ids = partition.good_ids();

        // Plan against what is actually installed, not the stored active set.
        let stored = allocator.load_state(feature).await?;
        let mut occupied = good_ids.clone();
        occupied.extend(partition.foreign.iter().copied());
        let base = FeatureIdState {
            free: stored.free.into_iter().filter(|id| !occupied.contains(id)).collect(),
            active: occupied,
        };
        let new_ids = plan_allocation(range, &base, partition.bad.len())
            .map_err(|available| range_exhausted(feature, range, partition.bad.len(), available))?
            .ids;

        let moves: Vec<(Rule, RuleId)> = partition.bad.iter().cloned().zip(new_ids.iter().copied()).collect();
        if !moves.is_empty() {
            let options = UpdateRuleOptions {
                remove_rule_ids: moves.iter().map(|(rule, _)| rule.id).collect(),
                add_rules: moves.iter().map(|(rule, id)| rule.with_id(*id)).collect(),
            };
            self.committer.update_dynamic_rules_locked(options).await?;
        }

        let mut active = good_ids.clone();
        active.extend(new_ids.iter().copied());
        let active: Vec<RuleId> = active.into_iter().collect();
        allocator.set_active_locked(feature, &active).await?;

        let outcome = MigrationOutcome {
            index: rebuild_host_index(index, &good_ids, &moves),
            migrated: moves.iter().map(|(rule, id)| MigratedRule { from: rule.id, to: *id }).collect(),
            retained: good_ids.into_iter().collect(),
        };

        if !outcome.migrated.is_empty() {
            info!(
                feature = %feature,
                migrated = outcome.migrated.len(),
                retained = outcome.retained.len(),
                "migrated rules into feature range"
            );
        }
        Ok(outcome)
    }
}

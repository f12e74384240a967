//! Host rule updates with allocator bookkeeping.
//!
//! Every change to the host's dynamic rule table goes through
//! [`RuleCommitter::update_dynamic_rules`]. The host applies the change first;
//! only when it succeeds are IDs that left the table returned to their
//! feature's free list. A rejected update leaves the bookkeeping untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruleward_kv::KeyValueStore;
use ruleward_rules::RuleEngine;
use ruleward_rules::RuleId;
use ruleward_rules::UpdateRuleOptions;
use tracing::debug;
use tracing::warn;

use crate::allocator::RuleIdAllocator;
use crate::error::RuleIdError;
use crate::feature::Feature;
use crate::verified::released_ids;

/// IDs returned to free lists by a successful update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Released IDs per owning feature.
    pub released: BTreeMap<Feature, Vec<RuleId>>,
    /// Removed IDs outside every registered range. No bookkeeping exists for them.
    pub unowned: Vec<RuleId>,
}

/// Applies rule changes to the host and reconciles the allocator.
pub struct RuleCommitter<S, H>
where
    S: KeyValueStore + ?Sized + 'static,
    H: RuleEngine + ?Sized,
{
    allocator: Arc<RuleIdAllocator<S>>,
    engine: Arc<H>,
}

impl<S, H> RuleCommitter<S, H>
where
    S: KeyValueStore + ?Sized + 'static,
    H: RuleEngine + ?Sized,
{
    pub fn new(allocator: Arc<RuleIdAllocator<S>>, engine: Arc<H>) -> Self {
        Self { allocator, engine }
    }

    pub fn allocator(&self) -> &Arc<RuleIdAllocator<S>> {
        &self.allocator
    }

    pub fn engine(&self) -> &Arc<H> {
        &self.engine
    }

    /// Apply `options` to the host in one call, then release freed IDs.
    ///
    /// An ID listed in both `remove_rule_ids` and `add_rules` is replaced in
    /// place and stays active. On [`RuleIdError::HostCommitFailed`] no
    /// bookkeeping has changed. Any other error comes from the store after
    /// the host applied the update; free lists of all features are then left
    /// as they were.
    pub async fn update_dynamic_rules(&self, options: UpdateRuleOptions) -> Result<CommitReport, RuleIdError> {
        self.allocator.lock().with_lock(|| self.update_dynamic_rules_locked(options)).await
    }

    pub(crate) async fn update_dynamic_rules_locked(
        &self,
        options: UpdateRuleOptions,
    ) -> Result<CommitReport, RuleIdError> {
        let released = released_ids(&options.remove_rule_ids, &options.add_rules);
        let removing = options.remove_rule_ids.len();
        let adding = options.add_rules.len();

        if let Err(source) = self.engine.update_rules(options).await {
            warn!(error = %source, removing, adding, "host rejected rule update");
            return Err(RuleIdError::HostCommitFailed { source });
        }
        debug!(removing, adding, "host rule update applied");

        let (groups, unowned) = self.allocator.registry().group_by_feature(&released);
        // The host has already applied the update. If this write fails the
        // freed IDs stay recorded as active: leaked, never handed out twice.
        let released = self.allocator.release_groups_locked(&groups).await?;
        Ok(CommitReport { released, unowned })
    }
}

//! Per-feature rule ID allocator.
//!
//! Each feature owns a contiguous ID range. Within it the allocator tracks an
//! active set (IDs currently installed) and a free list (IDs released and
//! safe to hand out again). Both are persisted together in one batch write,
//! so a crash never leaves an ID in both or neither by accident.
//!
//! Mutating calls take the allocator lock. The `*_locked` variants assume the
//! caller already holds it and are used to compose several steps into one
//! critical section.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruleward_kv::BatchOperation;
use ruleward_kv::KeyValueStore;
use ruleward_kv::WriteRequest;
use ruleward_rules::RuleId;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::constants::MAX_IDS_PER_CALL;
use crate::error::RuleIdError;
use crate::feature::Feature;
use crate::keys::active_ids_key;
use crate::keys::free_ids_key;
use crate::lock::RuleLock;
use crate::persist::ids_operation;
use crate::persist::read_json;
use crate::registry::IdRange;
use crate::registry::RangeRegistry;
use crate::verified::plan_allocation;
use crate::verified::plan_release;
use crate::verified::plan_set_active;
use crate::verified::FeatureIdState;

/// Allocates, releases and records rule IDs per feature.
pub struct RuleIdAllocator<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    registry: Arc<RangeRegistry>,
    lock: Arc<RuleLock<S>>,
}

impl<S: KeyValueStore + ?Sized + 'static> RuleIdAllocator<S> {
    pub fn new(store: Arc<S>, registry: Arc<RangeRegistry>, lock: Arc<RuleLock<S>>) -> Self {
        Self { store, registry, lock }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &RangeRegistry {
        &self.registry
    }

    pub fn lock(&self) -> &Arc<RuleLock<S>> {
        &self.lock
    }

    /// Allocate `count` unused IDs from `feature`'s range.
    ///
    /// IDs come from the free list first, then from the lowest unused IDs of
    /// the range. All-or-nothing: on [`RuleIdError::RangeExhausted`] nothing
    /// is recorded. The returned IDs are ascending.
    pub async fn allocate(&self, feature: Feature, count: usize) -> Result<Vec<RuleId>, RuleIdError> {
        check_count(count)?;
        self.registry.range_for(feature)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.lock.with_lock(|| self.allocate_locked(feature, count)).await
    }

    /// Return `ids` to `feature`'s free list.
    ///
    /// IDs outside the feature's range are logged and skipped.
    pub async fn release(&self, feature: Feature, ids: &[RuleId]) -> Result<(), RuleIdError> {
        check_count(ids.len())?;
        self.registry.range_for(feature)?;
        if ids.is_empty() {
            return Ok(());
        }
        let groups = BTreeMap::from([(feature, ids.to_vec())]);
        self.lock.with_lock(|| self.release_groups_locked(&groups)).await.map(|_| ())
    }

    /// Replace `feature`'s active set with `ids`.
    ///
    /// Fails with [`RuleIdError::IdOutOfRange`] if any ID is outside the range,
    /// leaving the stored state untouched.
    pub async fn set_active(&self, feature: Feature, ids: &[RuleId]) -> Result<(), RuleIdError> {
        check_count(ids.len())?;
        self.registry.range_for(feature)?;
        self.lock.with_lock(|| self.set_active_locked(feature, ids)).await
    }

    /// Active IDs of `feature`, ascending.
    pub async fn get_active(&self, feature: Feature) -> Result<Vec<RuleId>, RuleIdError> {
        self.registry.range_for(feature)?;
        let mut ids: Vec<RuleId> = read_json(&*self.store, &active_ids_key(feature)).await?.unwrap_or_default();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Free list of `feature`, in reuse order (last entry is handed out first).
    pub async fn get_free(&self, feature: Feature) -> Result<Vec<RuleId>, RuleIdError> {
        self.registry.range_for(feature)?;
        Ok(read_json(&*self.store, &free_ids_key(feature)).await?.unwrap_or_default())
    }

    pub(crate) async fn allocate_locked(&self, feature: Feature, count: usize) -> Result<Vec<RuleId>, RuleIdError> {
        let range = self.registry.range_for(feature)?;
        let state = self.load_state(feature).await?;

        let plan = plan_allocation(range, &state, count)
            .map_err(|available| range_exhausted(feature, range, count, available))?;

        self.persist_state(feature, &plan.state).await?;
        debug!(feature = %feature, ids = ?plan.ids, "allocated rule ids");
        Ok(plan.ids)
    }

    /// Release IDs for several features in one batch write.
    ///
    /// Either every feature's free list is updated or none is. Features with
    /// nothing moved are absent from the result.
    pub(crate) async fn release_groups_locked(
        &self,
        groups: &BTreeMap<Feature, Vec<RuleId>>,
    ) -> Result<BTreeMap<Feature, Vec<RuleId>>, RuleIdError> {
        let mut operations = Vec::new();
        let mut released = BTreeMap::new();

        for (&feature, ids) in groups {
            let range = self.registry.range_for(feature)?;
            let state = self.load_state(feature).await?;
            let plan = plan_release(range, &state, ids);

            if !plan.ignored.is_empty() {
                warn!(
                    feature = %feature,
                    ignored = ?plan.ignored,
                    "ignoring release of ids outside the feature range"
                );
            }
            if plan.state != state {
                operations.extend(state_operations(feature, &plan.state)?);
            }
            if !plan.released.is_empty() {
                released.insert(feature, plan.released);
            }
        }

        if !operations.is_empty() {
            self.store.write(WriteRequest::batch(operations)).await?;
        }
        for (feature, ids) in &released {
            debug!(feature = %feature, ids = ?ids, "released rule ids");
        }
        Ok(released)
    }

    pub(crate) async fn set_active_locked(&self, feature: Feature, ids: &[RuleId]) -> Result<(), RuleIdError> {
        let range = self.registry.range_for(feature)?;
        let state = self.load_state(feature).await?;
        let next = plan_set_active(range, &state, ids).map_err(|id| RuleIdError::IdOutOfRange {
            feature,
            id,
            start: range.start,
            end: range.end,
        })?;

        self.persist_state(feature, &next).await?;
        info!(feature = %feature, active = next.active.len(), "active rule ids replaced");
        Ok(())
    }

    pub(crate) async fn load_state(&self, feature: Feature) -> Result<FeatureIdState, RuleIdError> {
        let active: Vec<RuleId> = read_json(&*self.store, &active_ids_key(feature)).await?.unwrap_or_default();
        let free: Vec<RuleId> = read_json(&*self.store, &free_ids_key(feature)).await?.unwrap_or_default();
        Ok(FeatureIdState::new(active, free))
    }

    /// Write both halves of a feature's state in one batch.
    pub(crate) async fn persist_state(&self, feature: Feature, state: &FeatureIdState) -> Result<(), RuleIdError> {
        let operations = state_operations(feature, state)?;
        self.store.write(WriteRequest::batch(operations)).await?;
        Ok(())
    }
}

fn state_operations(feature: Feature, state: &FeatureIdState) -> Result<Vec<BatchOperation>, RuleIdError> {
    let active: Vec<RuleId> = state.active.iter().copied().collect();
    Ok(vec![
        ids_operation(active_ids_key(feature), &active)?,
        ids_operation(free_ids_key(feature), &state.free)?,
    ])
}

/// Log and build a [`RuleIdError::RangeExhausted`].
pub(crate) fn range_exhausted(feature: Feature, range: IdRange, requested: usize, available: usize) -> RuleIdError {
    error!(
        feature = %feature,
        requested,
        available,
        start = range.start,
        end = range.end,
        "rule id range exhausted"
    );
    RuleIdError::RangeExhausted {
        feature,
        requested,
        available,
    }
}

fn check_count(count: usize) -> Result<(), RuleIdError> {
    if count > MAX_IDS_PER_CALL as usize {
        return Err(RuleIdError::InvalidCount {
            count,
            max: MAX_IDS_PER_CALL,
        });
    }
    Ok(())
}

//! Read-only consistency check of persisted allocator state.

use std::str::FromStr;

use ruleward_kv::KeyValueStore;
use ruleward_kv::ScanRequest;
use ruleward_rules::RuleId;
use tracing::warn;

use crate::allocator::RuleIdAllocator;
use crate::constants::ACTIVE_IDS_KEY_PREFIX;
use crate::constants::FREE_IDS_KEY_PREFIX;
use crate::error::RuleIdError;
use crate::feature::Feature;
use crate::verified::check_state;
use crate::verified::StateViolation;

/// A single inconsistency found by [`RuleIdAllocator::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    /// A feature's state breaks a range or disjointness invariant.
    State { feature: Feature, violation: StateViolation },
    /// A feature's state could not be decoded.
    Unreadable { feature: Feature, reason: String },
    /// An allocator key names a feature that is not registered.
    UnregisteredKey { key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// IDs named by `State` findings, ascending.
    pub fn affected_ids(&self) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = self
            .findings
            .iter()
            .filter_map(|finding| match finding {
                AuditFinding::State { violation, .. } => Some(match violation {
                    StateViolation::ActiveOutOfRange(id)
                    | StateViolation::FreeOutOfRange(id)
                    | StateViolation::FreeAlsoActive(id)
                    | StateViolation::DuplicateFree(id) => *id,
                }),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl<S: KeyValueStore + ?Sized + 'static> RuleIdAllocator<S> {
    /// Check every registered feature's state. Writes nothing.
    ///
    /// Runs under the lock so the snapshot is consistent across keys.
    pub async fn audit(&self) -> Result<AuditReport, RuleIdError> {
        let report = self.lock().with_lock(|| self.audit_locked()).await?;
        if !report.is_clean() {
            warn!(
                findings = report.findings.len(),
                ids = ?report.affected_ids(),
                "allocator state audit found problems"
            );
        }
        Ok(report)
    }

    async fn audit_locked(&self) -> Result<AuditReport, RuleIdError> {
        let mut report = AuditReport::default();

        for entry in self.registry().entries() {
            match self.load_state(entry.feature).await {
                Ok(state) => report.findings.extend(check_state(entry.range(), &state).into_iter().map(|violation| {
                    AuditFinding::State {
                        feature: entry.feature,
                        violation,
                    }
                })),
                Err(RuleIdError::CorruptedData { reason, .. }) => report.findings.push(AuditFinding::Unreadable {
                    feature: entry.feature,
                    reason,
                }),
                Err(e) => return Err(e),
            }
        }

        for prefix in [ACTIVE_IDS_KEY_PREFIX, FREE_IDS_KEY_PREFIX] {
            let scan = self.store().scan(ScanRequest::prefix(prefix)).await?;
            for kv in scan.entries {
                let name = &kv.key[prefix.len()..];
                let registered = Feature::from_str(name)
                    .ok()
                    .is_some_and(|feature| self.registry().features().any(|f| f == feature));
                if !registered {
                    report.findings.push(AuditFinding::UnregisteredKey { key: kv.key });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruleward_kv::DeterministicKeyValueStore;
    use ruleward_kv::WriteRequest;

    use super::*;
    use crate::constants::DEFAULT_LOCK_KEY;
    use crate::lock::LockConfig;
    use crate::lock::RuleLock;
    use crate::registry::RangeRegistry;

    fn allocator() -> (Arc<DeterministicKeyValueStore>, RuleIdAllocator<DeterministicKeyValueStore>) {
        let store = DeterministicKeyValueStore::new();
        let lock = Arc::new(RuleLock::new(store.clone(), DEFAULT_LOCK_KEY, LockConfig::default()));
        (store.clone(), RuleIdAllocator::new(store, Arc::new(RangeRegistry::default()), lock))
    }

    #[tokio::test]
    async fn allocator_output_is_clean() {
        let (_, alloc) = allocator();
        alloc.allocate(Feature::Lockout, 3).await.unwrap();
        alloc.release(Feature::Lockout, &[10_001]).await.unwrap();
        alloc.allocate(Feature::Debug, 1).await.unwrap();
        assert!(alloc.audit().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn reports_hand_written_damage() {
        let (store, alloc) = allocator();
        store.write(WriteRequest::set("activeRuleIds:lockout", "[10000,20000]")).await.unwrap();
        store.write(WriteRequest::set("freeRuleIds:lockout", "[10000]")).await.unwrap();
        store.write(WriteRequest::set("activeRuleIds:wordBlocker", "nope")).await.unwrap();
        store.write(WriteRequest::set("freeRuleIds:adBlocker", "[1]")).await.unwrap();

        let report = alloc.audit().await.unwrap();

        assert!(report.findings.contains(&AuditFinding::State {
            feature: Feature::Lockout,
            violation: StateViolation::ActiveOutOfRange(20_000),
        }));
        assert!(report.findings.contains(&AuditFinding::State {
            feature: Feature::Lockout,
            violation: StateViolation::FreeAlsoActive(10_000),
        }));
        let unreadable = |f: &AuditFinding| matches!(f, AuditFinding::Unreadable { feature: Feature::WordBlocker, .. });
        assert!(report.findings.iter().any(unreadable));
        assert!(report.findings.contains(&AuditFinding::UnregisteredKey {
            key: "freeRuleIds:adBlocker".into(),
        }));
        assert_eq!(report.affected_ids(), vec![10_000, 20_000]);
    }
}

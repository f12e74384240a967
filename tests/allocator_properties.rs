//! Allocator behaviour observable through the public API.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use ruleward::DeterministicKeyValueStore;
use ruleward::DeterministicRuleEngine;
use ruleward::Feature;
use ruleward::LockConfig;
use ruleward::RangeEntry;
use ruleward::RangeRegistry;
use ruleward::RuleId;
use ruleward::RuleIdError;
use ruleward::RuleManager;
use ruleward::UpdateRuleOptions;
use ruleward::coordination::DEFAULT_RANGES;
use ruleward::coordination::constants::DEFAULT_LOCK_KEY;

type Manager = RuleManager<DeterministicKeyValueStore, DeterministicRuleEngine>;

fn manager(registry: RangeRegistry) -> Manager {
    RuleManager::new(
        DeterministicKeyValueStore::new(),
        DeterministicRuleEngine::new(),
        registry,
        DEFAULT_LOCK_KEY.to_string(),
        LockConfig::default(),
    )
}

async fn snapshot(manager: &Manager, feature: Feature) -> (Vec<RuleId>, Vec<RuleId>) {
    let alloc = manager.allocator();
    (alloc.get_active(feature).await.unwrap(), alloc.get_free(feature).await.unwrap())
}

#[test]
fn default_ranges_are_disjoint() {
    for (i, a) in DEFAULT_RANGES.iter().enumerate() {
        assert!(a.start >= 1 && a.start <= a.end);
        for b in &DEFAULT_RANGES[i + 1..] {
            assert!(!a.range().overlaps(&b.range()), "{} overlaps {}", a.feature, b.feature);
        }
    }
    RangeRegistry::new(DEFAULT_RANGES.to_vec()).unwrap();
}

#[tokio::test]
async fn set_active_is_idempotent() {
    let manager = manager(RangeRegistry::default());
    let alloc = manager.allocator();
    alloc.allocate(Feature::WordBlocker, 4).await.unwrap();
    alloc.release(Feature::WordBlocker, &[20_000, 20_003]).await.unwrap();

    alloc.set_active(Feature::WordBlocker, &[20_003, 20_010]).await.unwrap();
    let once = snapshot(&manager, Feature::WordBlocker).await;
    alloc.set_active(Feature::WordBlocker, &[20_003, 20_010]).await.unwrap();
    let twice = snapshot(&manager, Feature::WordBlocker).await;

    assert_eq!(once, twice);
    assert_eq!(once.0, vec![20_003, 20_010]);
    assert_eq!(once.1, vec![20_000]);
}

#[tokio::test]
async fn release_then_allocate_returns_the_same_id() {
    let manager = manager(RangeRegistry::default());
    let alloc = manager.allocator();
    alloc.allocate(Feature::Lockout, 5).await.unwrap();

    let x = alloc.allocate(Feature::Lockout, 1).await.unwrap()[0];
    alloc.release(Feature::Lockout, &[x]).await.unwrap();
    assert_eq!(alloc.allocate(Feature::Lockout, 1).await.unwrap(), vec![x]);
}

#[tokio::test]
async fn exhaustion_boundary() {
    let registry = RangeRegistry::new(vec![RangeEntry::new(Feature::Debug, 500, 504)]).unwrap();
    let manager = manager(registry);
    let alloc = manager.allocator();
    let all = alloc.allocate(Feature::Debug, 5).await.unwrap();
    assert_eq!(all, vec![500, 501, 502, 503, 504]);

    let err = alloc.allocate(Feature::Debug, 1).await.unwrap_err();
    assert!(matches!(err, RuleIdError::RangeExhausted { available: 0, .. }));

    alloc.release(Feature::Debug, &[502]).await.unwrap();
    assert_eq!(alloc.allocate(Feature::Debug, 1).await.unwrap(), vec![502]);
}

#[tokio::test]
async fn commit_reconciliation() {
    let manager = manager(RangeRegistry::default());
    let alloc = manager.allocator();
    let ids = alloc.allocate(Feature::Lockout, 2).await.unwrap();
    let (a, b) = (ids[0], ids[1]);
    let blueprint = Feature::Lockout.blueprint();
    manager
        .update_dynamic_rules(UpdateRuleOptions {
            add_rules: vec![blueprint.host_rule(a, "a.com"), blueprint.host_rule(b, "b.com")],
            ..Default::default()
        })
        .await
        .unwrap();

    manager
        .update_dynamic_rules(UpdateRuleOptions {
            remove_rule_ids: vec![a, b],
            add_rules: vec![blueprint.host_rule(a, "c.com")],
        })
        .await
        .unwrap();

    assert_eq!(alloc.get_active(Feature::Lockout).await.unwrap(), vec![a]);
    assert_eq!(alloc.get_free(Feature::Lockout).await.unwrap(), vec![b]);
}

#[derive(Debug, Clone)]
enum Op {
    Allocate(Feature, usize),
    /// Release the active ID at this position (modulo the active set size).
    Release(Feature, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let feature = prop_oneof![Just(Feature::Lockout), Just(Feature::WordBlocker)];
    prop_oneof![
        (feature.clone(), 0usize..6).prop_map(|(f, n)| Op::Allocate(f, n)),
        (feature, any::<usize>()).prop_map(|(f, i)| Op::Release(f, i)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn allocate_release_sequences_never_double_allocate(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let registry = RangeRegistry::new(vec![
                RangeEntry::new(Feature::Lockout, 1, 12),
                RangeEntry::new(Feature::WordBlocker, 13, 24),
            ])
            .unwrap();
            let manager = manager(registry);
            let alloc = manager.allocator();

            for op in ops {
                match op {
                    Op::Allocate(feature, count) => {
                        let before: BTreeSet<RuleId> = alloc.get_active(feature).await.unwrap().into_iter().collect();
                        match alloc.allocate(feature, count).await {
                            Ok(ids) => {
                                assert_eq!(ids.len(), count);
                                for id in &ids {
                                    assert!(!before.contains(id), "{id} handed out while active");
                                }
                            }
                            Err(RuleIdError::RangeExhausted { available, .. }) => {
                                assert_eq!(available, 12 - before.len());
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    Op::Release(feature, index) => {
                        let active = alloc.get_active(feature).await.unwrap();
                        if !active.is_empty() {
                            alloc.release(feature, &[active[index % active.len()]]).await.unwrap();
                        }
                    }
                }

                let lockout = alloc.get_active(Feature::Lockout).await.unwrap();
                let words = alloc.get_active(Feature::WordBlocker).await.unwrap();
                for (feature, active) in [(Feature::Lockout, &lockout), (Feature::WordBlocker, &words)] {
                    let unique: BTreeSet<RuleId> = active.iter().copied().collect();
                    assert_eq!(unique.len(), active.len());
                    let free = alloc.get_free(feature).await.unwrap();
                    assert!(free.iter().all(|id| !unique.contains(id)));
                }
                assert!(lockout.iter().all(|id| !words.contains(id)));
            }

            assert!(alloc.audit().await.unwrap().is_clean());
        });
    }
}

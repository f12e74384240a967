//! Startup migration of rules installed before per-feature ranges existed.

use std::sync::Arc;

use ruleward::DeterministicKeyValueStore;
use ruleward::DeterministicRuleEngine;
use ruleward::Feature;
use ruleward::HostIndex;
use ruleward::LockConfig;
use ruleward::RangeRegistry;
use ruleward::RuleManager;
use ruleward::coordination::constants::DEFAULT_LOCK_KEY;
use ruleward::coordination::host_index_key;
use ruleward::kv::KeyValueStore;
use ruleward::kv::WriteRequest;

type Manager = RuleManager<DeterministicKeyValueStore, DeterministicRuleEngine>;

fn manager(store: Arc<DeterministicKeyValueStore>, engine: Arc<DeterministicRuleEngine>) -> Manager {
    RuleManager::new(store, engine, RangeRegistry::default(), DEFAULT_LOCK_KEY.to_string(), LockConfig::default())
}

async fn seed_index(store: &DeterministicKeyValueStore, feature: Feature, index: &HostIndex) {
    let value = serde_json::to_string(index).unwrap();
    store.write(WriteRequest::set(host_index_key(feature), value)).await.unwrap();
}

#[tokio::test]
async fn legacy_lockout_rules_move_into_range() {
    let blueprint = Feature::Lockout.blueprint();
    let installed = vec![blueprint.host_rule(1, "a.com"), blueprint.host_rule(2, "b.com")];
    let engine = DeterministicRuleEngine::with_rules(installed);
    let store = DeterministicKeyValueStore::new();
    let legacy = HostIndex::from([("a.com".to_string(), 1), ("b.com".to_string(), 2)]);
    seed_index(&store, Feature::Lockout, &legacy).await;

    let manager = manager(store, engine.clone());
    let outcome = manager.run_startup_migration(Feature::Lockout).await.unwrap();

    assert_eq!(outcome.migrated.len(), 2);
    assert_eq!(engine.rule_ids().await, vec![10_000, 10_001]);
    assert!(engine.get(1).await.is_none());
    assert!(engine.get(2).await.is_none());

    let index = manager.host_index(Feature::Lockout).await.unwrap();
    assert_eq!(index, HostIndex::from([("a.com".to_string(), 10_000), ("b.com".to_string(), 10_001)]));
    assert!(index.values().all(|id| *id != 1 && *id != 2));
    assert_eq!(manager.allocator().get_active(Feature::Lockout).await.unwrap(), vec![10_000, 10_001]);

    let moved = engine.get(10_000).await.unwrap();
    assert_eq!(moved.redirect_extension_path(), Some("/lockout.html"));
}

#[tokio::test]
async fn migration_without_an_index_derives_hosts_from_filters() {
    let blueprint = Feature::WordBlocker.blueprint();
    let engine = DeterministicRuleEngine::with_rules(vec![blueprint.host_rule(7, "news.example")]);
    let manager = manager(DeterministicKeyValueStore::new(), engine.clone());

    manager.run_startup_migration(Feature::WordBlocker).await.unwrap();

    assert_eq!(engine.rule_ids().await, vec![20_000]);
    let index = manager.host_index(Feature::WordBlocker).await.unwrap();
    assert_eq!(index, HostIndex::from([("news.example".to_string(), 20_000)]));
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let blueprint = Feature::Lockout.blueprint();
    let engine = DeterministicRuleEngine::with_rules(vec![blueprint.host_rule(3, "a.com")]);
    let manager = manager(DeterministicKeyValueStore::new(), engine.clone());

    manager.run_startup_migration(Feature::Lockout).await.unwrap();
    let updates = engine.updates_applied();
    let outcome = manager.run_startup_migration(Feature::Lockout).await.unwrap();

    assert!(outcome.migrated.is_empty());
    assert_eq!(outcome.retained, vec![10_000]);
    assert_eq!(engine.updates_applied(), updates);
}

#[tokio::test]
async fn features_migrate_independently() {
    let lockout = Feature::Lockout.blueprint();
    let words = Feature::WordBlocker.blueprint();
    let engine = DeterministicRuleEngine::with_rules(vec![
        lockout.host_rule(1, "a.com"),
        words.host_rule(2, "b.com"),
        lockout.host_rule(20_005, "c.com"),
    ]);
    let manager = manager(DeterministicKeyValueStore::new(), engine.clone());

    for feature in [Feature::Lockout, Feature::WordBlocker] {
        manager.run_startup_migration(feature).await.unwrap();
    }

    let lockout_ids = manager.allocator().get_active(Feature::Lockout).await.unwrap();
    let word_ids = manager.allocator().get_active(Feature::WordBlocker).await.unwrap();
    assert_eq!(lockout_ids, vec![10_000, 10_001]);
    // 20005 returned to the word blocker's free list when the stray left it.
    assert_eq!(word_ids, vec![20_005]);
    assert_eq!(engine.rule_ids().await, vec![10_000, 10_001, 20_005]);
    assert!(manager.allocator().audit().await.unwrap().is_clean());
}

#[tokio::test]
async fn stray_in_foreign_range_survives_the_range_owner() {
    let stray = Feature::Lockout.blueprint().host_rule(20_005, "a.com");
    let engine = DeterministicRuleEngine::with_rules(vec![stray.clone()]);
    let manager = manager(DeterministicKeyValueStore::new(), engine.clone());

    let words = manager.run_startup_migration(Feature::WordBlocker).await.unwrap();
    assert!(words.active_ids().is_empty());
    assert!(manager.allocator().get_active(Feature::WordBlocker).await.unwrap().is_empty());

    manager.replace_feature_rules(Feature::WordBlocker, Vec::new()).await.unwrap();
    assert_eq!(engine.get(20_005).await, Some(stray));

    let lockout = manager.run_startup_migration(Feature::Lockout).await.unwrap();
    assert_eq!(lockout.migrated.len(), 1);
    assert_eq!(engine.rule_ids().await, vec![10_000]);
    assert_eq!(manager.host_index(Feature::Lockout).await.unwrap()["a.com"], 10_000);
}

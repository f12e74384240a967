//! ruleward: dynamic rule ID allocation for declarative network request engines.
//!
//! Features such as a site lockout, a word blocker and a debug blocker share a
//! single host table of dynamic rules. Each feature gets a disjoint ID range;
//! allocation, release and host updates are serialized through a lock kept in
//! the same key-value store as the bookkeeping, so state survives restarts and
//! concurrent callers never hand out the same ID twice.
//!
//! # Crates
//!
//! - [`kv`]: key-value store trait plus in-memory and redb backends
//! - [`rules`]: rule model and host rule engine trait
//! - [`coordination`]: lock, range registry, allocator, commit adapter,
//!   migration pass and the [`RuleManager`] that ties them together
//!
//! # Example
//!
//! ```ignore
//! use ruleward::AllocatorConfig;
//! use ruleward::Feature;
//! use ruleward::RuleManager;
//!
//! let manager = RuleManager::from_config(store, engine, &AllocatorConfig::default())?;
//! manager.run_startup_migration(Feature::Lockout).await?;
//! let rules = manager.apply_host_rules(Feature::Lockout, &["example.com".to_string()]).await?;
//! ```

pub mod telemetry;

pub use ruleward_coordination as coordination;
pub use ruleward_coordination::AllocatorConfig;
pub use ruleward_coordination::CommitReport;
pub use ruleward_coordination::ConfigError;
pub use ruleward_coordination::Feature;
pub use ruleward_coordination::HostIndex;
pub use ruleward_coordination::IdRange;
pub use ruleward_coordination::LockConfig;
pub use ruleward_coordination::MigrationOutcome;
pub use ruleward_coordination::RangeEntry;
pub use ruleward_coordination::RangeRegistry;
pub use ruleward_coordination::RuleCommitter;
pub use ruleward_coordination::RuleIdAllocator;
pub use ruleward_coordination::RuleIdError;
pub use ruleward_coordination::RuleLock;
pub use ruleward_coordination::RuleManager;
pub use ruleward_coordination::RuleMigrator;
pub use ruleward_kv as kv;
pub use ruleward_kv::DeterministicKeyValueStore;
pub use ruleward_kv::KeyValueStore;
pub use ruleward_kv::RedbKeyValueStore;
pub use ruleward_rules as rules;
pub use ruleward_rules::DeterministicRuleEngine;
pub use ruleward_rules::Rule;
pub use ruleward_rules::RuleEngine;
pub use ruleward_rules::RuleId;
pub use ruleward_rules::UpdateRuleOptions;

//! Rule ID coordination for dynamic network request rules.
//!
//! Several features share one host table of dynamic rules whose IDs must be
//! unique. This crate gives each feature a fixed ID range and makes every
//! change to that table safe under concurrent callers:
//!
//! - [`RangeRegistry`]: which feature owns which IDs
//! - [`RuleLock`]: mutual exclusion over the shared store, with backoff and TTL
//! - [`RuleIdAllocator`]: active sets and free lists per feature
//! - [`RuleCommitter`]: host updates that keep the allocator in step
//! - [`RuleMigrator`]: moves legacy rules into their owner's range
//! - [`RuleManager`]: host-level operations built from the above
//!
//! Business logic lives in [`verified`] as pure functions; the types above
//! load state, call into it, and persist the result.

pub mod allocator;
pub mod audit;
pub mod commit;
pub mod config;
pub mod constants;
pub mod error;
pub mod feature;
mod keys;
pub mod lock;
pub mod manager;
pub mod migration;
mod persist;
pub mod registry;
#[cfg(test)]
mod test_support;
pub mod types;
pub mod verified;

pub use allocator::RuleIdAllocator;
pub use audit::AuditFinding;
pub use audit::AuditReport;
pub use commit::CommitReport;
pub use commit::RuleCommitter;
pub use config::AllocatorConfig;
pub use config::ConfigError;
pub use error::RuleIdError;
pub use feature::Feature;
pub use feature::RuleBlueprint;
pub use keys::active_ids_key;
pub use keys::free_ids_key;
pub use keys::host_index_key;
pub use lock::LockConfig;
pub use lock::RuleLock;
pub use lock::RuleLockGuard;
pub use manager::RuleManager;
pub use migration::MigratedRule;
pub use migration::MigrationOutcome;
pub use migration::RuleMigrator;
pub use registry::IdRange;
pub use registry::RangeEntry;
pub use registry::RangeRegistry;
pub use registry::DEFAULT_RANGES;
pub use types::now_unix_ms;
pub use types::HostIndex;
pub use types::LockEntry;

//! Pure functions behind the allocator, lock and migration pass.
//!
//! Everything here is deterministic: no I/O, no clocks, no randomness. The
//! async shells in the parent modules load state, call into this module to
//! decide what to do, and persist the result.
//!
//! # Module Organization
//!
//! - [`lock`]: lock expiry, deadlines, fencing tokens, backoff with jitter
//! - [`allocation`]: picking, releasing and replacing IDs within a range
//! - [`reconcile`]: IDs freed by a host rule update
//! - [`migration`]: partitioning installed rules and repointing host indexes

pub mod allocation;
pub mod lock;
pub mod migration;
pub mod reconcile;

pub use allocation::check_state;
pub use allocation::plan_allocation;
pub use allocation::plan_release;
pub use allocation::plan_set_active;
pub use allocation::AllocationPlan;
pub use allocation::FeatureIdState;
pub use allocation::ReleasePlan;
pub use allocation::StateViolation;
pub use lock::compute_backoff_with_jitter;
pub use lock::compute_lock_deadline;
pub use lock::compute_next_fencing_token;
pub use lock::is_lock_expired;
pub use lock::BackoffResult;
pub use migration::partition_owned_rules;
pub use migration::rebuild_host_index;
pub use migration::MigrationPartition;
pub use reconcile::released_ids;

//! Fixed names and bounds for the rule ID allocator.
//!
//! Key names are part of the persisted layout; changing one orphans the state
//! written by earlier versions.

/// Prefix of the per-feature active ID set key (`activeRuleIds:<feature>`).
pub const ACTIVE_IDS_KEY_PREFIX: &str = "activeRuleIds:";

/// Prefix of the per-feature free ID list key (`freeRuleIds:<feature>`).
pub const FREE_IDS_KEY_PREFIX: &str = "freeRuleIds:";

/// Suffix of the per-feature host lookup index key (`<feature>HostIndex`).
pub const HOST_INDEX_KEY_SUFFIX: &str = "HostIndex";

/// Default key of the allocator lock entry.
pub const DEFAULT_LOCK_KEY: &str = "ruleIdAllocator_lock";

/// First retry delay when the lock is held.
pub const DEFAULT_LOCK_INITIAL_BACKOFF_MS: u64 = 10;

/// Retry delay cap.
pub const DEFAULT_LOCK_MAX_BACKOFF_MS: u64 = 1_000;

/// Acquisition attempts before giving up with `LockTimeout`.
pub const DEFAULT_LOCK_MAX_ATTEMPTS: u32 = 5;

/// Upper bound accepted for `max_attempts` in configuration.
pub const MAX_LOCK_ATTEMPTS: u32 = 100;

/// Age after which a lock entry from another holder may be taken over.
pub const DEFAULT_LOCK_TTL_MS: u64 = 30_000;

/// Most IDs a single allocate/release/set_active call may touch.
///
/// Matches the host's dynamic rule quota; no feature can legitimately need more.
pub const MAX_IDS_PER_CALL: u32 = 30_000;

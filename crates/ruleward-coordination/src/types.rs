//! Shared types for the rule ID allocator.

use std::collections::BTreeMap;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use ruleward_rules::RuleId;
use serde::Deserialize;
use serde::Serialize;

use crate::verified::compute_lock_deadline;
use crate::verified::is_lock_expired;

/// Host name to rule ID lookup kept per feature.
pub type HostIndex = BTreeMap<String, RuleId>;

/// Lock entry stored under the allocator lock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Unique identifier of the lock holder.
    pub holder_id: String,
    /// Incremented on every claim, so successive entries never serialize alike.
    pub fencing_token: u64,
    /// When the lock was acquired (Unix timestamp in milliseconds).
    pub acquired_at_ms: u64,
    /// TTL in milliseconds.
    pub ttl_ms: u64,
    /// Deadline = acquired_at_ms + ttl_ms.
    pub deadline_ms: u64,
}

impl LockEntry {
    pub fn new(holder_id: String, fencing_token: u64, acquired_at_ms: u64, ttl_ms: u64) -> Self {
        Self {
            holder_id,
            fencing_token,
            acquired_at_ms,
            ttl_ms,
            deadline_ms: compute_lock_deadline(acquired_at_ms, ttl_ms),
        }
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        is_lock_expired(self.deadline_ms, now_ms)
    }
}

/// Get current Unix timestamp in milliseconds.
#[inline]
pub fn now_unix_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

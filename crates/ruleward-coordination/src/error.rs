//! Error types for the rule ID allocator.

use ruleward_kv::KeyValueStoreError;
use ruleward_rules::RuleEngineError;
use ruleward_rules::RuleId;
use snafu::Snafu;

use crate::feature::Feature;

/// Errors from lock, registry, allocator, commit and migration operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuleIdError {
    /// Lock is held by another holder. Retried internally.
    #[snafu(display("lock '{key}' held by '{holder}' until {deadline_ms}ms"))]
    LockHeld {
        key: String,
        holder: String,
        deadline_ms: u64,
    },

    /// Lock could not be acquired within the retry budget.
    #[snafu(display("timed out acquiring lock '{key}' after {attempts} attempts"))]
    LockTimeout { key: String, attempts: u32 },

    /// Feature name has no registry entry.
    #[snafu(display("unknown feature '{name}'"))]
    UnknownFeature { name: String },

    /// The feature's range cannot supply the requested number of IDs.
    #[snafu(display("rule id range for {feature} exhausted: requested {requested}, available {available}"))]
    RangeExhausted {
        feature: Feature,
        requested: usize,
        available: usize,
    },

    /// The host rule engine rejected an update.
    #[snafu(display("host rejected rule update: {source}"))]
    HostCommitFailed { source: RuleEngineError },

    /// The host rule engine could not list installed rules.
    #[snafu(display("host failed to list rules: {source}"))]
    HostListFailed { source: RuleEngineError },

    /// An ID was used with a feature whose range does not contain it.
    #[snafu(display("rule id {id} is outside the {feature} range [{start}, {end}]"))]
    IdOutOfRange {
        feature: Feature,
        id: RuleId,
        start: RuleId,
        end: RuleId,
    },

    /// A registry entry has `start > end` or starts at zero.
    #[snafu(display("invalid range for {feature}: [{start}, {end}]"))]
    InvalidRange {
        feature: Feature,
        start: RuleId,
        end: RuleId,
    },

    /// Two registry entries overlap.
    #[snafu(display("ranges for {first} and {second} overlap"))]
    OverlappingRanges { first: Feature, second: Feature },

    /// A feature appears more than once in the registry.
    #[snafu(display("feature {feature} is registered more than once"))]
    DuplicateFeature { feature: Feature },

    /// Request touches more IDs than a single call may.
    #[snafu(display("invalid id count {count} (max: {max})"))]
    InvalidCount { count: usize, max: u32 },

    /// Data in storage is corrupted or unparseable.
    #[snafu(display("corrupted data in key '{key}': {reason}"))]
    CorruptedData { key: String, reason: String },

    /// CAS operation failed, retry may succeed.
    #[snafu(display("CAS conflict, retry needed"))]
    CasConflict,

    /// Underlying storage error.
    #[snafu(display("storage error: {source}"))]
    Storage { source: KeyValueStoreError },

    /// JSON serialization/deserialization error.
    #[snafu(display("serialization error: {source}"))]
    Serialization { source: serde_json::Error },
}

impl RuleIdError {
    /// True for the transient conditions the lock retries on its own.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, RuleIdError::LockHeld { .. } | RuleIdError::CasConflict)
    }
}

impl From<KeyValueStoreError> for RuleIdError {
    fn from(source: KeyValueStoreError) -> Self {
        RuleIdError::Storage { source }
    }
}

impl From<serde_json::Error> for RuleIdError {
    fn from(source: serde_json::Error) -> Self {
        RuleIdError::Serialization { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_exhausted_display() {
        let err = RuleIdError::RangeExhausted {
            feature: Feature::Lockout,
            requested: 3,
            available: 1,
        };
        assert_eq!(err.to_string(), "rule id range for lockout exhausted: requested 3, available 1");
    }

    #[test]
    fn host_failure_keeps_source_message() {
        let err = RuleIdError::HostCommitFailed {
            source: RuleEngineError::DuplicateId { id: 10000 },
        };
        assert_eq!(err.to_string(), "host rejected rule update: rule id 10000 is already in use");
    }

    #[test]
    fn contention_classification() {
        assert!(RuleIdError::CasConflict.is_lock_contention());
        assert!(
            RuleIdError::LockHeld {
                key: "k".into(),
                holder: "h".into(),
                deadline_ms: 1,
            }
            .is_lock_contention()
        );
        assert!(
            !RuleIdError::LockTimeout {
                key: "k".into(),
                attempts: 5,
            }
            .is_lock_contention()
        );
    }
}

//! Write command types.

use serde::Deserialize;
use serde::Serialize;

/// A single operation within a batch write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchOperation {
    Set { key: String, value: String },
    Delete { key: String },
}

impl BatchOperation {
    pub fn key(&self) -> &str {
        match self {
            BatchOperation::Set { key, .. } | BatchOperation::Delete { key } => key,
        }
    }
}

/// Commands for modifying key-value state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WriteCommand {
    /// Set a single key-value pair.
    Set { key: String, value: String },
    /// Delete a single key.
    Delete { key: String },
    /// Update `key` to `new_value` only if its current value equals `expected`.
    ///
    /// `expected: None` means the key must be absent.
    CompareAndSwap {
        key: String,
        expected: Option<String>,
        new_value: String,
    },
    /// Delete `key` only if its current value equals `expected`.
    CompareAndDelete { key: String, expected: String },
    /// Apply a mix of sets and deletes atomically.
    Batch { operations: Vec<BatchOperation> },
}

/// Request wrapper for a write command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteRequest {
    pub command: WriteCommand,
}

impl WriteRequest {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            command: WriteCommand::Set {
                key: key.into(),
                value: value.into(),
            },
        }
    }

    pub fn batch(operations: Vec<BatchOperation>) -> Self {
        Self {
            command: WriteCommand::Batch { operations },
        }
    }
}

/// Result of an applied write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteResult {
    /// The command that was applied.
    pub command: Option<WriteCommand>,
    /// Number of operations applied by a batch.
    pub batch_applied: Option<u32>,
}

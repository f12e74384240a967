//! In-memory implementation of [`KeyValueStore`] for testing.
//!
//! Provides a deterministic, non-persistent store for unit tests and
//! simulation of concurrent callers. Mirrors the command semantics of the
//! durable backend without disk I/O.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::constants::DEFAULT_SCAN_LIMIT;
use crate::constants::MAX_SCAN_RESULTS;
use crate::error::KeyValueStoreError;
use crate::read::DeleteRequest;
use crate::read::DeleteResult;
use crate::read::KeyValue;
use crate::read::ReadRequest;
use crate::read::ReadResult;
use crate::read::ScanRequest;
use crate::read::ScanResult;
use crate::traits::KeyValueStore;
use crate::validation::validate_write_command;
use crate::write::BatchOperation;
use crate::write::WriteCommand;
use crate::write::WriteRequest;
use crate::write::WriteResult;

/// In-memory deterministic implementation of [`KeyValueStore`].
///
/// Values are kept in a `BTreeMap` so scans return keys in order.
///
/// # Limitations
///
/// - No persistence across restarts
/// - Single process only
///
/// # Example
///
/// ```ignore
/// let store = DeterministicKeyValueStore::new();
/// store.write(WriteRequest::set("activeRuleIds:lockout", "[10000]")).await?;
/// ```
#[derive(Clone, Default)]
pub struct DeterministicKeyValueStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl DeterministicKeyValueStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot every stored key and value, in key order.
    pub async fn dump(&self) -> BTreeMap<String, String> {
        self.inner.lock().await.clone()
    }
}

fn apply_batch(inner: &mut BTreeMap<String, String>, operations: &[BatchOperation]) {
    for op in operations {
        match op {
            BatchOperation::Set { key, value } => {
                inner.insert(key.clone(), value.clone());
            }
            BatchOperation::Delete { key } => {
                inner.remove(key);
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for DeterministicKeyValueStore {
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError> {
        validate_write_command(&request.command)?;

        let mut inner = self.inner.lock().await;
        match request.command {
            WriteCommand::Set { ref key, ref value } => {
                inner.insert(key.clone(), value.clone());
            }
            WriteCommand::Delete { ref key } => {
                inner.remove(key);
            }
            WriteCommand::CompareAndSwap {
                ref key,
                ref expected,
                ref new_value,
            } => {
                let current = inner.get(key).cloned();
                if current.as_ref() != expected.as_ref() {
                    return Err(KeyValueStoreError::CompareAndSwapFailed {
                        key: key.clone(),
                        expected: expected.clone(),
                        actual: current,
                    });
                }
                inner.insert(key.clone(), new_value.clone());
            }
            WriteCommand::CompareAndDelete { ref key, ref expected } => {
                let current = inner.get(key).cloned();
                if current.as_deref() != Some(expected.as_str()) {
                    return Err(KeyValueStoreError::CompareAndSwapFailed {
                        key: key.clone(),
                        expected: Some(expected.clone()),
                        actual: current,
                    });
                }
                inner.remove(key);
            }
            WriteCommand::Batch { ref operations } => {
                apply_batch(&mut inner, operations);
                return Ok(WriteResult {
                    batch_applied: Some(operations.len() as u32),
                    ..Default::default()
                });
            }
        }

        Ok(WriteResult {
            command: Some(request.command),
            ..Default::default()
        })
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError> {
        let inner = self.inner.lock().await;
        match inner.get(&request.key) {
            Some(value) => Ok(ReadResult {
                kv: Some(KeyValue {
                    key: request.key,
                    value: value.clone(),
                }),
            }),
            None => Err(KeyValueStoreError::NotFound { key: request.key }),
        }
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, KeyValueStoreError> {
        let mut inner = self.inner.lock().await;
        let is_deleted = inner.remove(&request.key).is_some();
        Ok(DeleteResult {
            key: request.key,
            is_deleted,
        })
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, KeyValueStoreError> {
        let limit = request.limit.unwrap_or(DEFAULT_SCAN_LIMIT).min(MAX_SCAN_RESULTS) as usize;
        let inner = self.inner.lock().await;

        let mut matched = inner
            .range(request.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&request.prefix))
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            });

        let entries: Vec<KeyValue> = matched.by_ref().take(limit).collect();
        let is_truncated = matched.next().is_some();
        Ok(ScanResult { entries, is_truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_value(store: &DeterministicKeyValueStore, key: &str) -> Option<String> {
        match store.read(ReadRequest::new(key)).await {
            Ok(result) => result.kv.map(|kv| kv.value),
            Err(KeyValueStoreError::NotFound { .. }) => None,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_set_read_delete() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("a", "1")).await.unwrap();
        assert_eq!(read_value(&store, "a").await.as_deref(), Some("1"));

        let deleted = store.delete(DeleteRequest::new("a")).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(read_value(&store, "a").await, None);

        let again = store.delete(DeleteRequest::new("a")).await.unwrap();
        assert!(!again.is_deleted);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = DeterministicKeyValueStore::new();
        let err = store.read(ReadRequest::new("missing")).await.unwrap_err();
        assert_eq!(err, KeyValueStoreError::NotFound {
            key: "missing".into()
        });
    }

    #[tokio::test]
    async fn test_cas_absent_then_conflict() {
        let store = DeterministicKeyValueStore::new();
        let cas = |expected: Option<&str>, new_value: &str| WriteRequest {
            command: WriteCommand::CompareAndSwap {
                key: "lock".into(),
                expected: expected.map(str::to_string),
                new_value: new_value.into(),
            },
        };

        store.write(cas(None, "first")).await.unwrap();
        let err = store.write(cas(None, "second")).await.unwrap_err();
        assert!(matches!(
            err,
            KeyValueStoreError::CompareAndSwapFailed { actual: Some(ref v), .. } if v == "first"
        ));

        store.write(cas(Some("first"), "third")).await.unwrap();
        assert_eq!(read_value(&store, "lock").await.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn test_compare_and_delete_requires_match() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("lock", "mine")).await.unwrap();

        let wrong = WriteRequest {
            command: WriteCommand::CompareAndDelete {
                key: "lock".into(),
                expected: "theirs".into(),
            },
        };
        assert!(store.write(wrong).await.is_err());
        assert_eq!(read_value(&store, "lock").await.as_deref(), Some("mine"));

        let right = WriteRequest {
            command: WriteCommand::CompareAndDelete {
                key: "lock".into(),
                expected: "mine".into(),
            },
        };
        store.write(right).await.unwrap();
        assert_eq!(read_value(&store, "lock").await, None);
    }

    #[tokio::test]
    async fn test_batch_applies_sets_and_deletes() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("old", "x")).await.unwrap();

        let result = store
            .write(WriteRequest::batch(vec![
                BatchOperation::Set {
                    key: "new".into(),
                    value: "y".into(),
                },
                BatchOperation::Delete { key: "old".into() },
            ]))
            .await
            .unwrap();

        assert_eq!(result.batch_applied, Some(2));
        assert_eq!(read_value(&store, "new").await.as_deref(), Some("y"));
        assert_eq!(read_value(&store, "old").await, None);
    }

    #[tokio::test]
    async fn test_scan_prefix_in_order_with_limit() {
        let store = DeterministicKeyValueStore::new();
        for key in ["activeRuleIds:lockout", "activeRuleIds:debug", "freeRuleIds:debug", "activeRuleIds:wordBlocker"] {
            store.write(WriteRequest::set(key, "[]")).await.unwrap();
        }

        let all = store.scan(ScanRequest::prefix("activeRuleIds:")).await.unwrap();
        let keys: Vec<_> = all.entries.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["activeRuleIds:debug", "activeRuleIds:lockout", "activeRuleIds:wordBlocker"]);
        assert!(!all.is_truncated);

        let limited = store
            .scan(ScanRequest {
                prefix: "activeRuleIds:".into(),
                limit: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(limited.entries.len(), 2);
        assert!(limited.is_truncated);
    }
}

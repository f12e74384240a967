//! Store wrapper with write-failure injection for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use ruleward_kv::DeleteRequest;
use ruleward_kv::DeleteResult;
use ruleward_kv::DeterministicKeyValueStore;
use ruleward_kv::KeyValueStore;
use ruleward_kv::KeyValueStoreError;
use ruleward_kv::ReadRequest;
use ruleward_kv::ReadResult;
use ruleward_kv::ScanRequest;
use ruleward_kv::ScanResult;
use ruleward_kv::WriteCommand;
use ruleward_kv::WriteRequest;
use ruleward_kv::WriteResult;

/// Delegates to a [`DeterministicKeyValueStore`] but can fail one batch write.
///
/// Lock traffic uses compare-and-swap commands and is never failed.
pub(crate) struct FlakyStore {
    inner: Arc<DeterministicKeyValueStore>,
    /// Batches still allowed through before the armed failure; negative when disarmed.
    countdown: AtomicI64,
}

impl FlakyStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: DeterministicKeyValueStore::new(),
            countdown: AtomicI64::new(-1),
        })
    }

    /// Let `skip` batch writes through, then fail the next one.
    pub(crate) fn fail_batch_after(&self, skip: u32) {
        self.countdown.store(i64::from(skip), Ordering::SeqCst);
    }

    pub(crate) async fn dump(&self) -> BTreeMap<String, String> {
        self.inner.dump().await
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError> {
        if matches!(request.command, WriteCommand::Batch { .. }) {
            let previous = self
                .countdown
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n >= 0).then(|| n - 1));
            if previous == Ok(0) {
                return Err(KeyValueStoreError::Failed {
                    reason: "injected".to_string(),
                });
            }
        }
        self.inner.write(request).await
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError> {
        self.inner.read(request).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, KeyValueStoreError> {
        self.inner.delete(request).await
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, KeyValueStoreError> {
        self.inner.scan(request).await
    }
}

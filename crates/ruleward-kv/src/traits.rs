use async_trait::async_trait;

use crate::error::KeyValueStoreError;
use crate::read::DeleteRequest;
use crate::read::DeleteResult;
use crate::read::ReadRequest;
use crate::read::ReadResult;
use crate::read::ScanRequest;
use crate::read::ScanResult;
use crate::write::WriteRequest;
use crate::write::WriteResult;

/// Persisted key-value store interface.
///
/// Reads of a missing key return [`KeyValueStoreError::NotFound`]. There are no
/// multi-command transactions; callers that need read-modify-write sequences
/// must serialize them themselves (see the rule ID lock).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Apply a write command atomically.
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError>;

    /// Read a value by key.
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError>;

    /// Delete a key. Deleting a missing key succeeds with `is_deleted: false`.
    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, KeyValueStoreError>;

    /// List keys matching a prefix.
    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, KeyValueStoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError> {
        (**self).write(request).await
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError> {
        (**self).read(request).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, KeyValueStoreError> {
        (**self).delete(request).await
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, KeyValueStoreError> {
        (**self).scan(request).await
    }
}

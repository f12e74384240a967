//! Durable [`KeyValueStore`] backed by a single redb database file.
//!
//! Every write command runs inside one redb write transaction, so a crash
//! either persists the whole command or none of it. redb serializes write
//! transactions, which makes compare-and-swap a plain read-then-insert inside
//! the transaction.
//!
//! Transactions run synchronously inside the async trait methods and block
//! the calling runtime worker until they commit. Allocator values are short
//! JSON arrays, so each transaction is brief; move the calls onto
//! `spawn_blocking` before storing anything large here.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use redb::Database;
use redb::ReadableTable;
use redb::TableDefinition;
use snafu::ResultExt;
use snafu::Snafu;
use tracing::debug;

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

/// All keys live in one flat table.
const KV_TABLE: TableDefinition<&str, &str> = TableDefinition::new("ruleward_kv");

/// Errors from the redb backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RedbStoreError {
    #[snafu(display("failed to open redb database at {}: {source}", path.display()))]
    OpenDatabase {
        path: PathBuf,
        #[snafu(source(from(redb::DatabaseError, Box::new)))]
        source: Box<redb::DatabaseError>,
    },

    #[snafu(display("failed to create directory {}: {source}", path.display()))]
    CreateDirectory { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to begin write transaction: {source}"))]
    BeginWrite {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
    },

    #[snafu(display("failed to begin read transaction: {source}"))]
    BeginRead {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
    },

    #[snafu(display("failed to open table: {source}"))]
    OpenTable {
        #[snafu(source(from(redb::TableError, Box::new)))]
        source: Box<redb::TableError>,
    },

    #[snafu(display("failed to commit transaction: {source}"))]
    Commit {
        #[snafu(source(from(redb::CommitError, Box::new)))]
        source: Box<redb::CommitError>,
    },

    #[snafu(display("storage operation failed: {source}"))]
    Storage {
        #[snafu(source(from(redb::StorageError, Box::new)))]
        source: Box<redb::StorageError>,
    },
}

impl From<RedbStoreError> for KeyValueStoreError {
    fn from(err: RedbStoreError) -> Self {
        KeyValueStoreError::Failed {
            reason: err.to_string(),
        }
    }
}

/// redb-backed key-value store.
///
/// Cheap to clone; clones share the same database handle.
#[derive(Clone)]
pub struct RedbKeyValueStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbKeyValueStore {
    /// Create or open a store at the given path.
    ///
    /// Creates the parent directory and the key-value table if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RedbStoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context(CreateDirectorySnafu { path: parent })?;
            }
        }

        let db = if path.exists() {
            Database::open(&path).context(OpenDatabaseSnafu { path: &path })?
        } else {
            Database::create(&path).context(OpenDatabaseSnafu { path: &path })?
        };

        let write_txn = db.begin_write().context(BeginWriteSnafu)?;
        {
            write_txn.open_table(KV_TABLE).context(OpenTableSnafu)?;
        }
        write_txn.commit().context(CommitSnafu)?;

        debug!(path = %path.display(), "opened redb key-value store");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn apply(&self, command: &WriteCommand) -> Result<Option<u32>, KeyValueStoreError> {
        let write_txn = self.db.begin_write().context(BeginWriteSnafu)?;
        let mut batch_applied = None;
        {
            let mut table = write_txn.open_table(KV_TABLE).context(OpenTableSnafu)?;
            match command {
                WriteCommand::Set { key, value } => {
                    table.insert(key.as_str(), value.as_str()).context(StorageSnafu)?;
                }
                WriteCommand::Delete { key } => {
                    table.remove(key.as_str()).context(StorageSnafu)?;
                }
                WriteCommand::CompareAndSwap {
                    key,
                    expected,
                    new_value,
                } => {
                    let current = table.get(key.as_str()).context(StorageSnafu)?.map(|v| v.value().to_string());
                    if current.as_ref() != expected.as_ref() {
                        return Err(KeyValueStoreError::CompareAndSwapFailed {
                            key: key.clone(),
                            expected: expected.clone(),
                            actual: current,
                        });
                    }
                    table.insert(key.as_str(), new_value.as_str()).context(StorageSnafu)?;
                }
                WriteCommand::CompareAndDelete { key, expected } => {
                    let current = table.get(key.as_str()).context(StorageSnafu)?.map(|v| v.value().to_string());
                    if current.as_deref() != Some(expected.as_str()) {
                        return Err(KeyValueStoreError::CompareAndSwapFailed {
                            key: key.clone(),
                            expected: Some(expected.clone()),
                            actual: current,
                        });
                    }
                    table.remove(key.as_str()).context(StorageSnafu)?;
                }
                WriteCommand::Batch { operations } => {
                    for op in operations {
                        match op {
                            BatchOperation::Set { key, value } => {
                                table.insert(key.as_str(), value.as_str()).context(StorageSnafu)?;
                            }
                            BatchOperation::Delete { key } => {
                                table.remove(key.as_str()).context(StorageSnafu)?;
                            }
                        }
                    }
                    batch_applied = Some(operations.len() as u32);
                }
            }
        }
        write_txn.commit().context(CommitSnafu)?;
        Ok(batch_applied)
    }
}

#[async_trait]
impl KeyValueStore for RedbKeyValueStore {
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError> {
        validate_write_command(&request.command)?;
        let batch_applied = self.apply(&request.command)?;
        Ok(WriteResult {
            command: Some(request.command),
            batch_applied,
        })
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError> {
        let read_txn = self.db.begin_read().context(BeginReadSnafu)?;
        let table = read_txn.open_table(KV_TABLE).context(OpenTableSnafu)?;
        let value = table.get(request.key.as_str()).context(StorageSnafu)?.map(|v| v.value().to_string());
        match value {
            Some(value) => Ok(ReadResult {
                kv: Some(KeyValue {
                    key: request.key,
                    value,
                }),
            }),
            None => Err(KeyValueStoreError::NotFound { key: request.key }),
        }
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, KeyValueStoreError> {
        let write_txn = self.db.begin_write().context(BeginWriteSnafu)?;
        let is_deleted = {
            let mut table = write_txn.open_table(KV_TABLE).context(OpenTableSnafu)?;
            let removed = table.remove(request.key.as_str()).context(StorageSnafu)?;
            removed.is_some()
        };
        write_txn.commit().context(CommitSnafu)?;
        Ok(DeleteResult {
            key: request.key,
            is_deleted,
        })
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, KeyValueStoreError> {
        let limit = request.limit.unwrap_or(DEFAULT_SCAN_LIMIT).min(MAX_SCAN_RESULTS) as usize;
        let read_txn = self.db.begin_read().context(BeginReadSnafu)?;
        let table = read_txn.open_table(KV_TABLE).context(OpenTableSnafu)?;

        let mut entries = Vec::new();
        let mut is_truncated = false;
        for item in table.range(request.prefix.as_str()..).context(StorageSnafu)? {
            let (key, value) = item.context(StorageSnafu)?;
            let key = key.value();
            if !key.starts_with(&request.prefix) {
                break;
            }
            if entries.len() == limit {
                is_truncated = true;
                break;
            }
            entries.push(KeyValue {
                key: key.to_string(),
                value: value.value().to_string(),
            });
        }

        Ok(ScanResult { entries, is_truncated })
    }
}

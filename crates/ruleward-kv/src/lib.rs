//! Key-value store interface consumed by the rule ID allocator.
//!
//! The allocator keeps every piece of its state (active ID sets, free lists,
//! host indexes and the lock entry) in a flat string namespace. This crate
//! defines the request/response types for that namespace, the async
//! [`KeyValueStore`] trait, and two backends:
//!
//! - [`DeterministicKeyValueStore`]: in-memory, for tests and simulation
//! - [`RedbKeyValueStore`]: durable, survives process restarts
//!
//! # Consistency
//!
//! Each command is applied atomically. `Batch` applies all of its operations
//! or none of them; `CompareAndSwap` and `CompareAndDelete` give callers a
//! primitive to build cooperative locks on top of.

pub mod constants;
mod error;
pub mod inmemory;
mod read;
pub mod redb_store;
mod traits;
mod validation;
mod write;

pub use error::KeyValueStoreError;
pub use inmemory::DeterministicKeyValueStore;
pub use read::DeleteRequest;
pub use read::DeleteResult;
pub use read::KeyValue;
pub use read::ReadRequest;
pub use read::ReadResult;
pub use read::ScanRequest;
pub use read::ScanResult;
pub use redb_store::RedbKeyValueStore;
pub use redb_store::RedbStoreError;
pub use traits::KeyValueStore;
pub use validation::validate_write_command;
pub use write::BatchOperation;
pub use write::WriteCommand;
pub use write::WriteRequest;
pub use write::WriteResult;

//! Mutual exclusion for allocator read-modify-write sequences.
//!
//! Two layers cooperate:
//! - an in-process async mutex, so tasks sharing one [`RuleLock`] queue up
//!   instead of burning store round-trips against each other
//! - a lock entry in the key-value store, claimed by compare-and-swap and
//!   confirmed by re-reading, which excludes other workers sharing the store
//!
//! Entries carry a deadline; one left behind by a crashed holder can be
//! taken over once it passes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use ruleward_kv::KeyValueStore;
use ruleward_kv::KeyValueStoreError;
use ruleward_kv::ReadRequest;
use ruleward_kv::WriteCommand;
use ruleward_kv::WriteRequest;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::constants::DEFAULT_LOCK_INITIAL_BACKOFF_MS;
use crate::constants::DEFAULT_LOCK_MAX_ATTEMPTS;
use crate::constants::DEFAULT_LOCK_MAX_BACKOFF_MS;
use crate::constants::DEFAULT_LOCK_TTL_MS;
use crate::error::LockTimeoutSnafu;
use crate::error::RuleIdError;
use crate::types::now_unix_ms;
use crate::types::LockEntry;
use crate::verified::compute_backoff_with_jitter;
use crate::verified::compute_next_fencing_token;

/// Configuration for the allocator lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Initial backoff for retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff between retries in milliseconds.
    pub max_backoff_ms: u64,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Time-to-live for a lock entry in milliseconds.
    pub ttl_ms: u64,
    /// Add random jitter to each backoff.
    pub jitter: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: DEFAULT_LOCK_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_LOCK_MAX_BACKOFF_MS,
            max_attempts: DEFAULT_LOCK_MAX_ATTEMPTS,
            ttl_ms: DEFAULT_LOCK_TTL_MS,
            jitter: false,
        }
    }
}

/// The allocator lock.
///
/// Each handle has its own holder id. Clone the `Arc` around a handle to
/// share it between tasks of one worker; create separate handles to model
/// separate workers.
pub struct RuleLock<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    key: String,
    holder_id: String,
    config: LockConfig,
    local: Arc<Mutex<()>>,
}

impl<S: KeyValueStore + ?Sized + 'static> RuleLock<S> {
    /// Create a lock handle with a fresh random holder id.
    pub fn new(store: Arc<S>, key: impl Into<String>, config: LockConfig) -> Self {
        Self::with_holder_id(store, key, Uuid::new_v4().to_string(), config)
    }

    pub fn with_holder_id(
        store: Arc<S>,
        key: impl Into<String>,
        holder_id: impl Into<String>,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            holder_id: holder_id.into(),
            config,
            local: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the lock, retrying with exponential backoff.
    ///
    /// Fails with [`RuleIdError::LockTimeout`] after `max_attempts` attempts.
    pub async fn acquire(&self) -> Result<RuleLockGuard<S>, RuleIdError> {
        let local = self.local.clone().lock_owned().await;
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff_ms = self.config.initial_backoff_ms;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.try_claim().await {
                Ok(entry_json) => {
                    debug!(key = %self.key, holder = %self.holder_id, attempts, "lock acquired");
                    return Ok(RuleLockGuard {
                        store: self.store.clone(),
                        key: self.key.clone(),
                        entry_json,
                        local: Some(local),
                        is_released: false,
                    });
                }
                Err(e) if e.is_lock_contention() => {
                    if attempts >= max_attempts {
                        warn!(key = %self.key, attempts, "giving up on lock");
                        return LockTimeoutSnafu {
                            key: self.key.clone(),
                            attempts,
                        }
                        .fail();
                    }

                    // Create rng here to avoid holding non-Send type across await
                    let jitter_seed = if self.config.jitter {
                        rand::rng().random_range(0..=backoff_ms)
                    } else {
                        0
                    };
                    let backoff = compute_backoff_with_jitter(backoff_ms, self.config.max_backoff_ms, jitter_seed);

                    debug!(
                        key = %self.key,
                        error = %e,
                        attempts,
                        backoff_ms = backoff.sleep_ms,
                        "lock busy, backing off"
                    );

                    tokio::time::sleep(Duration::from_millis(backoff.sleep_ms)).await;
                    backoff_ms = backoff.next_backoff_ms;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released after `f` completes, whether it succeeded or not.
    /// A release failure is logged and does not mask `f`'s result; the entry
    /// then lapses after its TTL.
    pub async fn with_lock<F, Fut, T>(&self, f: F) -> Result<T, RuleIdError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RuleIdError>>,
    {
        let guard = self.acquire().await?;
        let result = f().await;
        if let Err(e) = guard.release().await {
            warn!(key = %self.key, error = %e, "failed to release lock, it will lapse after its ttl");
        }
        result
    }

    /// One claim attempt against the store. Returns the JSON written on success.
    async fn try_claim(&self) -> Result<String, RuleIdError> {
        let now_ms = now_unix_ms();
        let current = self.read_raw().await?;
        let mut previous_token = None;

        if let Some(raw) = &current {
            let parsed = serde_json::from_str::<LockEntry>(raw);
            if let Ok(entry) = &parsed {
                previous_token = Some(entry.fencing_token);
            }
            match parsed {
                Ok(entry) if entry.holder_id == self.holder_id => {
                    debug!(key = %self.key, "reclaiming entry left by this holder");
                }
                Ok(entry) if !entry.is_expired_at(now_ms) => {
                    return Err(RuleIdError::LockHeld {
                        key: self.key.clone(),
                        holder: entry.holder_id,
                        deadline_ms: entry.deadline_ms,
                    });
                }
                Ok(entry) => {
                    warn!(
                        key = %self.key,
                        previous_holder = %entry.holder_id,
                        deadline_ms = entry.deadline_ms,
                        "taking over expired lock"
                    );
                }
                Err(_) => {
                    warn!(key = %self.key, "lock entry unreadable, treating it as stale");
                }
            }
        }

        let token = compute_next_fencing_token(previous_token);
        let entry = LockEntry::new(self.holder_id.clone(), token, now_ms, self.config.ttl_ms);
        let entry_json = serde_json::to_string(&entry)?;

        match self
            .store
            .write(WriteRequest {
                command: WriteCommand::CompareAndSwap {
                    key: self.key.clone(),
                    expected: current,
                    new_value: entry_json.clone(),
                },
            })
            .await
        {
            Ok(_) => {}
            Err(KeyValueStoreError::CompareAndSwapFailed { .. }) => return Err(RuleIdError::CasConflict),
            Err(e) => return Err(RuleIdError::Storage { source: e }),
        }

        // The CAS alone is not trusted on stores with weaker guarantees.
        if self.read_raw().await?.as_deref() != Some(entry_json.as_str()) {
            return Err(RuleIdError::CasConflict);
        }
        Ok(entry_json)
    }

    async fn read_raw(&self) -> Result<Option<String>, RuleIdError> {
        match self.store.read(ReadRequest::new(self.key.clone())).await {
            Ok(result) => Ok(result.kv.map(|kv| kv.value)),
            Err(KeyValueStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(RuleIdError::Storage { source: e }),
        }
    }
}

/// Proof of lock ownership. Releases on drop.
pub struct RuleLockGuard<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    key: String,
    entry_json: String,
    local: Option<OwnedMutexGuard<()>>,
    is_released: bool,
}

impl<S: KeyValueStore + ?Sized + 'static> RuleLockGuard<S> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock and report storage errors.
    ///
    /// Dropping the guard also releases, but in the background.
    pub async fn release(mut self) -> Result<(), RuleIdError> {
        self.is_released = true;
        let result = release_entry(&*self.store, &self.key, &self.entry_json).await;
        self.local.take();
        result
    }
}

impl<S: KeyValueStore + ?Sized + 'static> Drop for RuleLockGuard<S> {
    fn drop(&mut self) {
        if self.is_released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "no runtime to release lock on drop, it will lapse after its ttl");
            return;
        };

        let store = self.store.clone();
        let key = self.key.clone();
        let entry_json = self.entry_json.clone();
        handle.spawn(async move {
            if let Err(e) = release_entry(&*store, &key, &entry_json).await {
                debug!(key = %key, error = %e, "lock release on drop failed (will lapse via ttl)");
            }
        });
    }
}

async fn release_entry<S: KeyValueStore + ?Sized>(store: &S, key: &str, entry_json: &str) -> Result<(), RuleIdError> {
    match store
        .write(WriteRequest {
            command: WriteCommand::CompareAndDelete {
                key: key.to_string(),
                expected: entry_json.to_string(),
            },
        })
        .await
    {
        Ok(_) => {
            debug!(key = %key, "lock released");
            Ok(())
        }
        Err(KeyValueStoreError::CompareAndSwapFailed { .. }) => {
            warn!(key = %key, "lock entry changed while held, leaving it in place");
            Ok(())
        }
        Err(e) => Err(RuleIdError::Storage { source: e }),
    }
}

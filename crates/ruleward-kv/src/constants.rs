//! Fixed bounds for key-value operations.
//!
//! Tiger Style: every request is bounded so a malformed caller cannot make the
//! store allocate without limit.

/// Maximum key length in bytes.
pub const MAX_KEY_SIZE: u32 = 1024;

/// Maximum value length in bytes (1 MiB).
pub const MAX_VALUE_SIZE: u32 = 1024 * 1024;

/// Maximum number of keys touched by a single multi-key command.
pub const MAX_BATCH_KEYS: u32 = 1_000;

/// Default number of entries returned by a scan.
pub const DEFAULT_SCAN_LIMIT: u32 = 1_000;

/// Upper bound on entries returned by a scan.
pub const MAX_SCAN_RESULTS: u32 = 10_000;

//! Pure lock computation functions.
//!
//! # Tiger Style
//!
//! - Uses saturating arithmetic for all calculations
//! - Time is passed explicitly (no calls to system time)

/// Next fencing token when claiming over `previous`. Always >= 1.
#[inline]
pub fn compute_next_fencing_token(previous: Option<u64>) -> u64 {
    match previous {
        Some(token) => token.saturating_add(1),
        None => 1,
    }
}

/// Compute lock deadline from acquisition time and TTL.
#[inline]
pub fn compute_lock_deadline(acquired_at_ms: u64, ttl_ms: u64) -> u64 {
    acquired_at_ms.saturating_add(ttl_ms)
}

/// Check if a lock entry has expired.
///
/// A deadline of 0 is treated as released.
#[inline]
pub fn is_lock_expired(deadline_ms: u64, now_ms: u64) -> bool {
    deadline_ms == 0 || now_ms > deadline_ms
}

/// Result of backoff calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// Sleep duration in milliseconds (includes jitter).
    pub sleep_ms: u64,
    /// Next backoff value (for exponential increase).
    pub next_backoff_ms: u64,
}

/// Compute exponential backoff with optional jitter.
///
/// `jitter_seed` is reduced modulo `current_backoff_ms / 2 + 1`; pass 0 for
/// a deterministic schedule (10, 20, 40, ... capped at `max_backoff_ms`).
///
/// ```ignore
/// let result = compute_backoff_with_jitter(100, 1000, 25);
/// assert_eq!(result.sleep_ms, 125);
/// assert_eq!(result.next_backoff_ms, 200);
/// ```
#[inline]
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    BackoffResult {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fencing_token_increments() {
        assert_eq!(compute_next_fencing_token(None), 1);
        assert_eq!(compute_next_fencing_token(Some(4)), 5);
        assert_eq!(compute_next_fencing_token(Some(u64::MAX)), u64::MAX);
    }

    #[test]
    fn deadline_saturates() {
        assert_eq!(compute_lock_deadline(1_000, 500), 1_500);
        assert_eq!(compute_lock_deadline(u64::MAX, 1), u64::MAX);
    }

    #[test]
    fn expiry() {
        assert!(is_lock_expired(0, 1_000));
        assert!(is_lock_expired(1_000, 2_000));
        assert!(!is_lock_expired(2_000, 1_000));
        assert!(!is_lock_expired(2_000, 2_000));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = 10;
        let mut sleeps = Vec::new();
        for _ in 0..9 {
            let result = compute_backoff_with_jitter(backoff, 1_000, 0);
            sleeps.push(result.sleep_ms);
            backoff = result.next_backoff_ms;
        }
        assert_eq!(sleeps, vec![10, 20, 40, 80, 160, 320, 640, 1_000, 1_000]);
    }

    #[test]
    fn jitter_is_bounded() {
        let result = compute_backoff_with_jitter(100, 1_000, 1_000_003);
        assert!(result.sleep_ms >= 100 && result.sleep_ms <= 150);
        assert_eq!(result.next_backoff_ms, 200);
    }
}

//! Tracing setup for binaries and test harnesses embedding the allocator.

use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used (for
/// example `"info"` or `"ruleward_coordination=debug"`). Returns `false` if a
/// global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().try_init().is_ok()
}

//! Allocator configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `RULEWARD_*` environment variables, which always win.
//!
//! ```toml
//! lock_key = "ruleIdAllocator_lock"
//!
//! [lock]
//! max_attempts = 5
//! initial_backoff_ms = 10
//!
//! [[ranges]]
//! feature = "lockout"
//! start = 10000
//! end = 19999
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;
use tracing::info;

use crate::constants::DEFAULT_LOCK_KEY;
use crate::constants::MAX_LOCK_ATTEMPTS;
use crate::error::RuleIdError;
use crate::lock::LockConfig;
use crate::registry::RangeEntry;
use crate::registry::RangeRegistry;
use crate::registry::DEFAULT_RANGES;

pub const ENV_LOCK_KEY: &str = "RULEWARD_LOCK_KEY";
pub const ENV_LOCK_MAX_ATTEMPTS: &str = "RULEWARD_LOCK_MAX_ATTEMPTS";
pub const ENV_LOCK_INITIAL_BACKOFF_MS: &str = "RULEWARD_LOCK_INITIAL_BACKOFF_MS";
pub const ENV_LOCK_MAX_BACKOFF_MS: &str = "RULEWARD_LOCK_MAX_BACKOFF_MS";
pub const ENV_LOCK_TTL_MS: &str = "RULEWARD_LOCK_TTL_MS";

/// Configuration errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue { key: String, value: String, reason: String },

    #[snafu(display("failed to read config file {path}: {source}"))]
    ReadFile { path: String, source: std::io::Error },

    #[snafu(display("failed to parse config file {path}: {source}"))]
    ParseToml { path: String, source: toml::de::Error },

    /// The range table does not form a valid registry.
    #[snafu(display("invalid range table: {source}"))]
    InvalidRanges { source: RuleIdError },
}

/// Settings for the lock, the lock key and the range table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub lock_key: String,
    pub lock: LockConfig,
    pub ranges: Vec<RangeEntry>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            lock: LockConfig::default(),
            ranges: DEFAULT_RANGES.to_vec(),
        }
    }
}

impl AllocatorConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).context(ParseTomlSnafu { path: "<inline>" })
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path: display.clone() })?;
        toml::from_str(&contents).context(ParseTomlSnafu { path: display })
    }

    /// Defaults, then `path` if it exists, then environment overrides. Validated.
    pub fn load_with_layers(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading allocator configuration");
                Self::from_toml_file(path)?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `RULEWARD_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from any key lookup, such as a map in tests.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = lookup(ENV_LOCK_KEY) {
            self.lock_key = val;
        }
        if let Some(val) = lookup(ENV_LOCK_MAX_ATTEMPTS) {
            self.lock.max_attempts = parse_value(ENV_LOCK_MAX_ATTEMPTS, val)?;
        }
        if let Some(val) = lookup(ENV_LOCK_INITIAL_BACKOFF_MS) {
            self.lock.initial_backoff_ms = parse_value(ENV_LOCK_INITIAL_BACKOFF_MS, val)?;
        }
        if let Some(val) = lookup(ENV_LOCK_MAX_BACKOFF_MS) {
            self.lock.max_backoff_ms = parse_value(ENV_LOCK_MAX_BACKOFF_MS, val)?;
        }
        if let Some(val) = lookup(ENV_LOCK_TTL_MS) {
            self.lock.ttl_ms = parse_value(ENV_LOCK_TTL_MS, val)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String, reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.lock_key.trim().is_empty() {
            return Err(invalid("lock_key", self.lock_key.clone(), "must not be empty"));
        }
        if self.lock.max_attempts == 0 || self.lock.max_attempts > MAX_LOCK_ATTEMPTS {
            return Err(invalid(
                "lock.max_attempts",
                self.lock.max_attempts.to_string(),
                &format!("must be between 1 and {MAX_LOCK_ATTEMPTS}"),
            ));
        }
        if self.lock.initial_backoff_ms == 0 {
            return Err(invalid("lock.initial_backoff_ms", "0".into(), "must be positive"));
        }
        if self.lock.max_backoff_ms < self.lock.initial_backoff_ms {
            return Err(invalid(
                "lock.max_backoff_ms",
                self.lock.max_backoff_ms.to_string(),
                "must not be below lock.initial_backoff_ms",
            ));
        }
        if self.lock.ttl_ms == 0 {
            return Err(invalid("lock.ttl_ms", "0".into(), "must be positive"));
        }
        self.registry().map(|_| ())
    }

    /// Build the range registry described by `ranges`.
    pub fn registry(&self) -> Result<RangeRegistry, ConfigError> {
        RangeRegistry::new(self.ranges.clone()).context(InvalidRangesSnafu)
    }
}

fn parse_value<T>(key: &str, val: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("must be a number: {e}"),
        value: val.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::feature::Feature;

    #[test]
    fn defaults_are_valid() {
        let config = AllocatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lock_key, "ruleIdAllocator_lock");
        assert_eq!(config.lock.max_attempts, 5);
        assert_eq!(config.lock.initial_backoff_ms, 10);
        assert_eq!(config.lock.max_backoff_ms, 1_000);
        assert_eq!(config.registry().unwrap(), RangeRegistry::default());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AllocatorConfig::from_toml_str(
            r#"
            lock_key = "custom_lock"

            [lock]
            max_attempts = 8

            [[ranges]]
            feature = "debug"
            start = 50000
            end = 50999
            "#,
        )
        .unwrap();

        assert_eq!(config.lock_key, "custom_lock");
        assert_eq!(config.lock.max_attempts, 8);
        assert_eq!(config.lock.initial_backoff_ms, 10);
        assert_eq!(config.ranges, vec![RangeEntry::new(Feature::Debug, 50_000, 50_999)]);
        config.validate().unwrap();
    }

    #[test]
    fn overlapping_ranges_fail_validation() {
        let config = AllocatorConfig::from_toml_str(
            r#"
            [[ranges]]
            feature = "lockout"
            start = 1
            end = 100

            [[ranges]]
            feature = "wordBlocker"
            start = 50
            end = 150
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRanges { .. })));
    }

    #[test]
    fn unknown_feature_fails_to_parse() {
        let err = AllocatorConfig::from_toml_str("[[ranges]]\nfeature = \"ads\"\nstart = 1\nend = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn overrides_win() {
        let env = HashMap::from([
            (ENV_LOCK_KEY, "other_lock"),
            (ENV_LOCK_MAX_ATTEMPTS, "9"),
            (ENV_LOCK_TTL_MS, "5000"),
        ]);
        let mut config = AllocatorConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.lock_key, "other_lock");
        assert_eq!(config.lock.max_attempts, 9);
        assert_eq!(config.lock.ttl_ms, 5_000);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = AllocatorConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_LOCK_MAX_BACKOFF_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_LOCK_MAX_BACKOFF_MS));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AllocatorConfig::default();
        config.lock.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[lock]\nttl_ms = 1234").unwrap();
        let config = AllocatorConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.lock.ttl_ms, 1_234);

        let missing = AllocatorConfig::from_toml_file("/nonexistent/ruleward.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::ReadFile { .. }));
    }
}

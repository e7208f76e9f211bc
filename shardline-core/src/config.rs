//! Runtime configuration.
//!
//! Configuration is loaded from TOML (every section is optional and falls
//! back to its defaults) and may then be overridden from `SHARDLINE_*`
//! environment variables.
//!
//! ```toml
//! [retry]
//! attempts = 10
//! constant_delay_ms = 25
//! variable_delay_ms = 25
//!
//! [ledger]
//! chunk_size = 90
//! concurrency = 3
//! ```

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limits::{
    BALANCE_CACHE_TTL_SECS_DEFAULT, BATCH_GET_KEYS_MAX, BATCH_RETRY_BUDGET_DEFAULT,
    DIRECTORY_CACHE_TTL_SECS_DEFAULT, LEDGER_CHUNK_SIZE_DEFAULT, LEDGER_CONCURRENCY_DEFAULT,
    LEDGER_CONCURRENCY_MAX, REGISTRY_CACHE_TTL_SECS_DEFAULT, RETRY_ATTEMPTS_DEFAULT,
    RETRY_ATTEMPTS_MAX, RETRY_CONSTANT_DELAY_MS_DEFAULT, RETRY_VARIABLE_DELAY_MS_DEFAULT,
};

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read config from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Parse error in TOML.
    #[error("failed to parse config: {message}")]
    Parse {
        /// Error message.
        message: String,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// The environment variable.
        var: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A configured value is out of bounds.
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

// -----------------------------------------------------------------------------
// Sections
// -----------------------------------------------------------------------------

/// Retry and backoff tunables for the item executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for single-item operations (first try included).
    pub attempts: u32,
    /// Number of times an unprocessed batch residue is re-issued.
    pub batch_retry_budget: u32,
    /// Constant part of the wait between attempts, in milliseconds.
    pub constant_delay_ms: u64,
    /// Per-attempt part of the wait between attempts, in milliseconds.
    pub variable_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS_DEFAULT,
            batch_retry_budget: BATCH_RETRY_BUDGET_DEFAULT,
            constant_delay_ms: RETRY_CONSTANT_DELAY_MS_DEFAULT,
            variable_delay_ms: RETRY_VARIABLE_DELAY_MS_DEFAULT,
        }
    }
}

impl RetryConfig {
    /// Wait before the attempt following attempt number `attempt` (1-based).
    ///
    /// Linear: `constant + attempt * variable`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let variable = self.variable_delay_ms.saturating_mul(u64::from(attempt));
        Duration::from_millis(self.constant_delay_ms.saturating_add(variable))
    }
}

/// Cache key prefix and TTLs per cache class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix prepended to every cache key.
    pub key_prefix: String,
    /// TTL for shard registry entries, in seconds.
    pub registry_ttl_secs: u64,
    /// TTL for directory (assignment) entries, in seconds.
    pub directory_ttl_secs: u64,
    /// TTL for balance entries, in seconds.
    pub balance_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "sl".to_string(),
            registry_ttl_secs: REGISTRY_CACHE_TTL_SECS_DEFAULT,
            directory_ttl_secs: DIRECTORY_CACHE_TTL_SECS_DEFAULT,
            balance_ttl_secs: BALANCE_CACHE_TTL_SECS_DEFAULT,
        }
    }
}

impl CacheConfig {
    /// TTL for shard registry entries.
    #[must_use]
    pub const fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }

    /// TTL for directory entries.
    #[must_use]
    pub const fn directory_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_ttl_secs)
    }

    /// TTL for balance entries.
    #[must_use]
    pub const fn balance_ttl(&self) -> Duration {
        Duration::from_secs(self.balance_ttl_secs)
    }
}

/// Balance ledger read fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Owner keys per batch-get chunk.
    pub chunk_size: usize,
    /// Chunks fetched concurrently per wave.
    pub concurrency: usize,
    /// Entity type under which balance owners are assigned to shards.
    pub entity_type: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chunk_size: LEDGER_CHUNK_SIZE_DEFAULT,
            concurrency: LEDGER_CONCURRENCY_DEFAULT,
            entity_type: "userBalances".to_string(),
        }
    }
}

/// Names of the registry tables and their indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Shard registry table.
    pub shard_registry: String,
    /// Assignment directory table.
    pub shard_assignments: String,
    /// Registry index on `(entity_type, allocation_state)`.
    pub entity_allocation_index: String,
    /// Registry index on `entity_type`.
    pub entity_index: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            shard_registry: "shard_registry".to_string(),
            shard_assignments: "shard_assignments".to_string(),
            entity_allocation_index: "entity_allocation_index".to_string(),
            entity_index: "entity_index".to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// ShardlineConfig
// -----------------------------------------------------------------------------

/// Complete Shardline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardlineConfig {
    /// Retry engine tunables.
    pub retry: RetryConfig,
    /// Cache-aside tunables.
    pub cache: CacheConfig,
    /// Ledger read fan-out.
    pub ledger: LedgerConfig,
    /// Registry table layout.
    pub tables: TableConfig,
}

impl ShardlineConfig {
    /// Creates a config with zero backoff delays (for testing).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            retry: RetryConfig {
                constant_delay_ms: 0,
                variable_delay_ms: 0,
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Loads a config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses a config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Serializes the config to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Applies overrides from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `SHARDLINE_RETRY_ATTEMPTS`
    /// - `SHARDLINE_RETRY_BATCH_BUDGET`
    /// - `SHARDLINE_RETRY_CONSTANT_DELAY_MS`
    /// - `SHARDLINE_RETRY_VARIABLE_DELAY_MS`
    /// - `SHARDLINE_CACHE_PREFIX`
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "SHARDLINE_RETRY_ATTEMPTS")? {
            self.retry.attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "SHARDLINE_RETRY_BATCH_BUDGET")? {
            self.retry.batch_retry_budget = v;
        }
        if let Some(v) = parse_var(&lookup, "SHARDLINE_RETRY_CONSTANT_DELAY_MS")? {
            self.retry.constant_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SHARDLINE_RETRY_VARIABLE_DELAY_MS")? {
            self.retry.variable_delay_ms = v;
        }
        if let Some(prefix) = lookup("SHARDLINE_CACHE_PREFIX") {
            self.cache.key_prefix = prefix;
        }
        Ok(self)
    }

    /// Validates bounds that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-bounds field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.attempts",
                reason: "must be positive",
            });
        }
        if self.retry.attempts > RETRY_ATTEMPTS_MAX {
            return Err(ConfigError::Invalid {
                field: "retry.attempts",
                reason: "must be <= 100",
            });
        }
        if self.ledger.chunk_size == 0 || self.ledger.chunk_size > BATCH_GET_KEYS_MAX {
            return Err(ConfigError::Invalid {
                field: "ledger.chunk_size",
                reason: "must be in 1..=100",
            });
        }
        if self.ledger.concurrency == 0 || self.ledger.concurrency > LEDGER_CONCURRENCY_MAX {
            return Err(ConfigError::Invalid {
                field: "ledger.concurrency",
                reason: "must be in 1..=32",
            });
        }
        if self.ledger.entity_type.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ledger.entity_type",
                reason: "must not be empty",
            });
        }
        if self.cache.key_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cache.key_prefix",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ShardlineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.attempts, 10);
        assert_eq!(config.ledger.chunk_size, 90);
        assert_eq!(config.ledger.concurrency, 3);
    }

    #[test]
    fn test_linear_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_after(1), Duration::from_millis(50));
        assert_eq!(retry.delay_after(2), Duration::from_millis(75));
        assert_eq!(retry.delay_after(4), Duration::from_millis(125));

        let testing = ShardlineConfig::for_testing();
        assert_eq!(testing.retry.delay_after(7), Duration::ZERO);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ShardlineConfig::from_toml_str(
            r#"
            [retry]
            attempts = 3

            [cache]
            key_prefix = "test"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.constant_delay_ms, 25);
        assert_eq!(config.cache.key_prefix, "test");
        assert_eq!(config.tables, TableConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ShardlineConfig::for_testing();
        let parsed = ShardlineConfig::from_toml_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ledger]\nconcurrency = 5").unwrap();
        let config = ShardlineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ledger.concurrency, 5);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ShardlineConfig::from_file("/nonexistent/shardline.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SHARDLINE_RETRY_ATTEMPTS", "4"),
            ("SHARDLINE_RETRY_CONSTANT_DELAY_MS", "0"),
            ("SHARDLINE_CACHE_PREFIX", "stage"),
        ]);
        let config = ShardlineConfig::default()
            .with_overrides(|k| vars.get(k).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.retry.attempts, 4);
        assert_eq!(config.retry.constant_delay_ms, 0);
        assert_eq!(config.retry.variable_delay_ms, 25);
        assert_eq!(config.cache.key_prefix, "stage");
    }

    #[test]
    fn test_invalid_override() {
        let result = ShardlineConfig::default().with_overrides(|k| {
            (k == "SHARDLINE_RETRY_ATTEMPTS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_validate_bounds() {
        let mut config = ShardlineConfig::default();
        config.ledger.chunk_size = 101;
        assert!(config.validate().is_err());

        let mut config = ShardlineConfig::default();
        config.retry.attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ShardlineConfig::default();
        config.ledger.concurrency = 0;
        assert!(config.validate().is_err());
    }
}

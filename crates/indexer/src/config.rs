//! Configuration management for the tzmeta indexer.
//!
//! Configuration is loaded from a TOML file, with `${VAR_NAME}`
//! environment-variable placeholders expanded before parsing and serde
//! defaults filling the gaps.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Big-map update sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Link resolver configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name stamped on every record (e.g. "mainnet", "ghostnet")
    pub name: String,

    /// TzKT API base URL (e.g. "https://api.tzkt.io")
    pub tzkt_url: String,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g. "sqlite://tzmeta.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Big-map update sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Polling interval in seconds for new big-map updates.
    ///
    /// **Must be > 0** - zero will cause a panic in tokio::time::interval.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Number of big-map updates fetched per request
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

/// Link resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// IPFS gateway base URL
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for one whole resolution attempt in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Transient failures tolerated before a record fails permanently
    #[serde(default = "default_max_retry_count_on_error")]
    pub max_retry_count_on_error: u32,

    /// Maximum accepted response body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Interval in seconds between resolution cycles.
    ///
    /// **Must be > 0** - zero will cause a panic in tokio::time::interval.
    #[serde(default = "default_resolve_interval_secs")]
    pub resolve_interval_secs: u64,

    /// Number of unresolved records fetched per resolution cycle
    #[serde(default = "default_resolve_batch_size")]
    pub resolve_batch_size: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ipfs_gateway: default_ipfs_gateway(),
            request_timeout_secs: default_request_timeout_secs(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            max_retry_count_on_error: default_max_retry_count_on_error(),
            max_body_bytes: default_max_body_bytes(),
            resolve_interval_secs: default_resolve_interval_secs(),
            resolve_batch_size: default_resolve_batch_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_batch_size() -> u32 {
    100
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_max_retry_count_on_error() -> u32 {
    3
}

fn default_max_body_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_resolve_interval_secs() -> u64 {
    15
}

fn default_resolve_batch_size() -> u32 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax,
    /// for example: `tzkt_url = "${TZKT_URL}"`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = Self::expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.name.is_empty() {
            anyhow::bail!("Network name cannot be empty");
        }

        if self.network.tzkt_url.is_empty() {
            anyhow::bail!("Network tzkt_url cannot be empty");
        }
        if !self.network.tzkt_url.starts_with("http://")
            && !self.network.tzkt_url.starts_with("https://")
        {
            anyhow::bail!("Network tzkt_url must start with http:// or https://");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.sync.poll_interval_secs == 0 {
            anyhow::bail!("Sync poll_interval_secs must be > 0 (tokio interval cannot be zero)");
        }
        if self.sync.batch_size == 0 {
            anyhow::bail!("Sync batch_size must be > 0");
        }

        if !self.resolver.ipfs_gateway.starts_with("http://")
            && !self.resolver.ipfs_gateway.starts_with("https://")
        {
            anyhow::bail!("Resolver ipfs_gateway must start with http:// or https://");
        }
        if self.resolver.request_timeout_secs == 0 {
            anyhow::bail!("Resolver request_timeout_secs must be > 0");
        }
        if self.resolver.attempt_timeout_secs == 0 {
            anyhow::bail!("Resolver attempt_timeout_secs must be > 0");
        }
        if self.resolver.max_retry_count_on_error == 0 {
            anyhow::bail!("Resolver max_retry_count_on_error must be > 0");
        }
        if self.resolver.max_body_bytes == 0 {
            anyhow::bail!("Resolver max_body_bytes must be > 0");
        }
        if self.resolver.resolve_interval_secs == 0 {
            anyhow::bail!(
                "Resolver resolve_interval_secs must be > 0 (tokio interval cannot be zero)"
            );
        }
        if self.resolver.resolve_batch_size == 0 {
            anyhow::bail!("Resolver resolve_batch_size must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }

    /// Expand environment variables in the format `${VAR_NAME}`.
    ///
    /// Lines whose first non-whitespace character is `#` are left
    /// untouched, so commented-out examples never trigger expansion.
    ///
    /// # Errors
    /// Returns an error on an unclosed or empty placeholder, or when a
    /// referenced environment variable is not set.
    fn expand_env_vars(input: &str) -> Result<String> {
        let mut result = String::with_capacity(input.len());

        for (index, line) in input.lines().enumerate() {
            if index > 0 {
                result.push('\n');
            }

            if line.trim_start().starts_with('#') {
                result.push_str(line);
                continue;
            }

            let mut rest = line;
            while let Some(start) = rest.find("${") {
                result.push_str(&rest[..start]);
                let after = &rest[start + 2..];

                let Some(end) = after.find('}') else {
                    anyhow::bail!(
                        "Unclosed environment variable placeholder on line {}",
                        index + 1
                    );
                };

                let name = &after[..end];
                if name.is_empty() {
                    anyhow::bail!("Empty environment variable name on line {}", index + 1);
                }

                let value = std::env::var(name).map_err(|_| {
                    anyhow::anyhow!(
                        "Environment variable '{}' is not set (referenced on line {})",
                        name,
                        index + 1
                    )
                })?;
                result.push_str(&value);

                rest = &after[end + 1..];
            }
            result.push_str(rest);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://tzmeta.db"
max_connections = 5
min_connections = 1

[sync]
poll_interval_secs = 10
batch_size = 100

[resolver]
ipfs_gateway = "https://cloudflare-ipfs.com"
max_retry_count_on_error = 3

[logging]
level = "info"
format = "pretty"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.network.name, "mainnet");
        assert_eq!(config.database.url, "sqlite://tzmeta.db");
        assert_eq!(config.resolver.ipfs_gateway, "https://cloudflare-ipfs.com");
    }

    #[test]
    fn test_default_values() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://test.db"
        "#;

        let config = Config::from_toml_str(toml).unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.sync.poll_interval_secs, 10);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.resolver.ipfs_gateway, "https://ipfs.io");
        assert_eq!(config.resolver.attempt_timeout_secs, 30);
        assert_eq!(config.resolver.max_retry_count_on_error, 3);
        assert_eq!(config.resolver.max_body_bytes, 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_validation_empty_network_name() {
        let toml = r#"
[network]
name = ""
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://test.db"
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Network name"));
    }

    #[test]
    fn test_validation_bad_tzkt_url() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "ftp://api.tzkt.io"

[database]
url = "sqlite://test.db"
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("tzkt_url"));
    }

    #[test]
    fn test_validation_zero_retry_count() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://test.db"

[resolver]
max_retry_count_on_error = 0
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_retry_count_on_error"));
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://test.db"

[sync]
poll_interval_secs = 0
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("poll_interval_secs") && err.contains("must be > 0"));
    }

    #[test]
    fn test_validation_connection_bounds() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://test.db"
max_connections = 2
min_connections = 4
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("min_connections"));
    }

    #[test]
    fn test_validation_bad_log_level() {
        let toml = r#"
[network]
name = "mainnet"
tzkt_url = "https://api.tzkt.io"

[database]
url = "sqlite://test.db"

[logging]
level = "verbose"
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Logging level"));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TZMETA_TEST_VAR", "hello");
        let result = Config::expand_env_vars("value is ${TZMETA_TEST_VAR}").unwrap();
        assert_eq!(result, "value is hello");

        std::env::set_var("TZMETA_VAR1", "foo");
        std::env::set_var("TZMETA_VAR2", "bar");
        let result = Config::expand_env_vars("${TZMETA_VAR1} and ${TZMETA_VAR2}").unwrap();
        assert_eq!(result, "foo and bar");

        let result = Config::expand_env_vars("no variables here").unwrap();
        assert_eq!(result, "no variables here");

        std::env::remove_var("TZMETA_TEST_VAR");
        std::env::remove_var("TZMETA_VAR1");
        std::env::remove_var("TZMETA_VAR2");
    }

    #[test]
    fn test_expand_env_vars_undefined() {
        let result = Config::expand_env_vars("value is ${TZMETA_UNDEFINED_12345}");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("TZMETA_UNDEFINED_12345"));
    }

    #[test]
    fn test_expand_env_vars_empty_name() {
        let result = Config::expand_env_vars("value is ${}");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Empty"));
    }

    #[test]
    fn test_expand_env_vars_unclosed() {
        let result = Config::expand_env_vars("value is ${UNCLOSED");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unclosed"));
    }

    #[test]
    fn test_expand_env_vars_ignores_comment_lines() {
        let input = "# example: url = \"${TZMETA_NOT_SET}\"\nkey = \"value\"";
        let result = Config::expand_env_vars(input).unwrap();
        assert!(result.contains("${TZMETA_NOT_SET}"));
        assert!(result.contains("key = \"value\""));
    }

    #[test]
    fn test_config_with_env_vars() {
        std::env::set_var("TZMETA_TEST_TZKT", "https://api.ghostnet.tzkt.io");

        let toml = r#"
[network]
name = "ghostnet"
tzkt_url = "${TZMETA_TEST_TZKT}"

[database]
url = "sqlite://test.db"
        "#;

        let expanded = Config::expand_env_vars(toml).unwrap();
        let config = Config::from_toml_str(&expanded).unwrap();
        assert_eq!(config.network.tzkt_url, "https://api.ghostnet.tzkt.io");

        std::env::remove_var("TZMETA_TEST_TZKT");
    }
}

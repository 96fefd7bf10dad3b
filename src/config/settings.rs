//! # Configuration Settings
//!
//! Defines the configuration structure for the external secrets manager and
//! loads it from `EXTSECRETS_*` environment variables.

use crate::errors::{ExtSecretsError, Result};
use crate::secrets::BackoffPolicy;
use crate::services::EncryptionConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Default interval between periodic secret refresh passes
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 300;

/// Default first retry delay after a provider fails to initialize or connect
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 10_000;

/// Default cap for the retry delay
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 300_000;

/// Main application configuration
#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    /// Manager scheduling configuration
    #[validate(nested)]
    pub manager: ManagerConfig,

    /// Settings encryption key
    pub encryption: EncryptionConfig,

    /// PostgreSQL settings store; in-memory store when absent
    #[validate(nested)]
    pub database: Option<DatabaseConfig>,

    /// Logging configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Whether periodic and manual secret refreshes are allowed
    pub feature_enabled: bool,
}

impl AppConfig {
    /// Load and validate the full configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            manager: ManagerConfig::from_env()?,
            encryption: EncryptionConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
            feature_enabled: env_or("EXTSECRETS_ENABLED", true)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(ExtSecretsError::from)?;
        self.manager.validate_custom()?;
        Ok(())
    }
}

/// Scheduling configuration for the secrets manager
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManagerConfig {
    /// Seconds between periodic refresh passes
    #[validate(range(min = 1, message = "Update interval must be at least 1 second"))]
    pub update_interval_secs: u64,

    /// First retry delay in milliseconds
    #[validate(range(min = 1, message = "Initial backoff must be at least 1ms"))]
    pub initial_backoff_ms: u64,

    /// Retry delay cap in milliseconds
    #[validate(range(min = 1, message = "Max backoff must be at least 1ms"))]
    pub max_backoff_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl ManagerConfig {
    /// Load manager configuration from environment variables
    ///
    /// Uses:
    /// - `EXTSECRETS_UPDATE_INTERVAL_SECS` (default: 300)
    /// - `EXTSECRETS_INITIAL_BACKOFF_MS` (default: 10000)
    /// - `EXTSECRETS_MAX_BACKOFF_MS` (default: 300000)
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            update_interval_secs: env_or(
                "EXTSECRETS_UPDATE_INTERVAL_SECS",
                DEFAULT_UPDATE_INTERVAL_SECS,
            )?,
            initial_backoff_ms: env_or("EXTSECRETS_INITIAL_BACKOFF_MS", DEFAULT_INITIAL_BACKOFF_MS)?,
            max_backoff_ms: env_or("EXTSECRETS_MAX_BACKOFF_MS", DEFAULT_MAX_BACKOFF_MS)?,
        })
    }

    /// Get the refresh interval as Duration
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Get the retry policy
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    fn validate_custom(&self) -> Result<()> {
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ExtSecretsError::validation_field(
                "Max backoff cannot be smaller than the initial backoff",
                "max_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// PostgreSQL configuration for the settings store
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Build a configuration for the given URL with default pool settings
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), max_connections: 5, connect_timeout_seconds: 10 }
    }

    /// Load database configuration; `None` when `EXTSECRETS_DATABASE_URL` is unset
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("EXTSECRETS_DATABASE_URL") else {
            return Ok(None);
        };

        let mut config = Self::new(url);
        config.max_connections = env_or("EXTSECRETS_DATABASE_MAX_CONNECTIONS", 5)?;
        config.connect_timeout_seconds = env_or("EXTSECRETS_DATABASE_CONNECT_TIMEOUT_SECS", 10)?;
        Ok(Some(config))
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}

impl ObservabilityConfig {
    /// Load logging configuration from `EXTSECRETS_LOG_LEVEL` and `EXTSECRETS_LOG_JSON`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("EXTSECRETS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            json_logging: env_or("EXTSECRETS_LOG_JSON", false)?,
        })
    }
}

/// Parse an environment variable, falling back to `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ExtSecretsError::config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

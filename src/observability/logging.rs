//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{ExtSecretsError, Result};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for a provider lifecycle operation.
///
/// ```rust,ignore
/// let span = provider_span!("reload", "vault");
/// let span = provider_span!("retry", "vault", delay_ms = 20_000u64);
/// ```
#[macro_export]
macro_rules! provider_span {
    ($operation:expr, $provider:expr) => {
        tracing::info_span!(
            "provider_operation",
            operation = %$operation,
            provider = %$provider,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $provider:expr, $($field:tt)*) => {
        tracing::info_span!(
            "provider_operation",
            operation = %$operation,
            provider = %$provider,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| ExtSecretsError::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if config.json_logging {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| ExtSecretsError::internal(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        update_interval_secs = config.manager.update_interval_secs,
        initial_backoff_ms = config.manager.initial_backoff_ms,
        max_backoff_ms = config.manager.max_backoff_ms,
        settings_store = if config.database.is_some() { "postgresql" } else { "memory" },
        feature_enabled = config.feature_enabled,
        "External secrets manager configuration"
    );
}

//! # Database Connection Pool Management
//!
//! PostgreSQL connection pool for the settings store.

use crate::config::DatabaseConfig;
use crate::errors::{ExtSecretsError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Type alias for the database connection pool
pub type DbPool = PgPool;

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    validate_config(config)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(true)
        .connect(&config.url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, url = %sanitize_url(&config.url), "Failed to create database pool");
            ExtSecretsError::storage(
                format!("Failed to connect to database: {}", sanitize_url(&config.url)),
                e,
            )
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        connect_timeout_ms = u64::try_from(config.connect_timeout().as_millis()).unwrap_or(u64::MAX),
        "Database connection pool created"
    );

    Ok(pool)
}

fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(ExtSecretsError::validation("max_connections must be greater than 0"));
    }

    if !config.url.starts_with("postgres://") && !config.url.starts_with("postgresql://") {
        return Err(ExtSecretsError::validation(
            "database URL must start with 'postgres://' or 'postgresql://'",
        ));
    }

    Ok(())
}

/// Sanitize database URL for logging (remove credentials)
fn sanitize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.password().is_some() || !parsed.username().is_empty() => format!(
            "{}://***:***@{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or("unknown"),
            parsed.path()
        ),
        _ => url.to_string(),
    }
}

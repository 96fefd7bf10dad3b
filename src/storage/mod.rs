//! # Storage and Persistence
//!
//! Persistence for the encrypted provider settings bundle. The manager talks
//! to [`SettingsStore`]; [`MemorySettingsStore`] backs single-process and
//! test setups, [`PgSettingsStore`] backs deployments with PostgreSQL.

pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod settings_store;

pub use migrations::run_migrations;
pub use pool::{create_pool, DbPool};
pub use postgres::PgSettingsStore;
pub use settings_store::{MemorySettingsStore, SettingsStore, SettingsTransaction};

/// Row key of the encrypted bundle in the `settings` table
pub const EXTERNAL_SECRETS_SETTINGS_KEY: &str = "feature.externalSecrets";

use crate::errors::{ExtSecretsError, Result};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| ExtSecretsError::storage("Database connectivity check failed", e))?;

    Ok(())
}

//! PostgreSQL settings store
//!
//! Keeps the encrypted bundle in one row of the `settings` table.
//! Transactions take a transaction-scoped advisory lock on the row key so
//! concurrent read-modify-write cycles run one after another, including the
//! very first write when the row does not exist yet.

use super::settings_store::{SettingsStore, SettingsTransaction};
use super::{DbPool, EXTERNAL_SECRETS_SETTINGS_KEY};
use crate::errors::{ExtSecretsError, Result};
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::instrument;

const SELECT_VALUE: &str = "SELECT value FROM settings WHERE key = $1";

const UPSERT_VALUE: &str = "INSERT INTO settings (key, value, load_on_startup) VALUES ($1, $2, TRUE) \
     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value";

#[derive(Debug, Clone)]
pub struct PgSettingsStore {
    pool: DbPool,
    key: String,
}

impl PgSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_key(pool, EXTERNAL_SECRETS_SETTINGS_KEY)
    }

    /// Store the bundle under a custom settings key
    pub fn with_key(pool: DbPool, key: impl Into<String>) -> Self {
        Self { pool, key: key.into() }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    #[instrument(skip(self), fields(key = %self.key), name = "settings_get")]
    async fn get_encrypted_settings(&self) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(SELECT_VALUE)
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to read external secrets settings", e))
    }

    #[instrument(skip(self, blob), fields(key = %self.key), name = "settings_save")]
    async fn save_encrypted_settings(&self, blob: String) -> Result<()> {
        sqlx::query(UPSERT_VALUE)
            .bind(&self.key)
            .bind(blob)
            .execute(&self.pool)
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to save external secrets settings", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn SettingsTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to begin settings transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&self.key)
            .execute(&mut *tx)
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to lock external secrets settings", e))?;

        Ok(Box::new(PgSettingsTransaction { tx, key: self.key.clone() }))
    }
}

struct PgSettingsTransaction {
    tx: Transaction<'static, Postgres>,
    key: String,
}

#[async_trait]
impl SettingsTransaction for PgSettingsTransaction {
    async fn get_encrypted_settings(&mut self) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(SELECT_VALUE)
            .bind(&self.key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to read external secrets settings", e))
    }

    async fn save_encrypted_settings(&mut self, blob: String) -> Result<()> {
        sqlx::query(UPSERT_VALUE)
            .bind(&self.key)
            .bind(blob)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to save external secrets settings", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ExtSecretsError::storage("Failed to commit settings transaction", e))
    }
}

//! # Database Migration Management
//!
//! Idempotent schema setup for the PostgreSQL settings store. Statements are
//! embedded in the binary and safe to run on every startup.

use crate::errors::{ExtSecretsError, Result};
use crate::storage::DbPool;
use tracing::{error, info};

/// Schema statements applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "create settings table",
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key VARCHAR(255) PRIMARY KEY,
        value TEXT NOT NULL,
        load_on_startup BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
)];

/// Run all schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    for (description, sql) in MIGRATIONS {
        sqlx::query(sql).execute(pool).await.map_err(|e| {
            error!(error = %e, migration = %description, "Migration failed");
            ExtSecretsError::storage(format!("Failed to run migration '{}'", description), e)
        })?;
    }

    info!(count = MIGRATIONS.len(), "Database migrations applied");
    Ok(())
}

//! # extsecrets
//!
//! Lifecycle manager for pluggable external secrets providers.
//!
//! ## Architecture
//!
//! ```text
//! caller → SecretsManager → SettingsStore (encrypted bundle)
//!               ↓        ↘ ProviderRegistry → SecretsProvider instances
//!         refresh loop    RetryScheduler (per-provider backoff)
//! ```
//!
//! ## Core Components
//!
//! - **Secrets Manager**: owns live providers, the settings cache, the refresh loop
//! - **Providers**: `env` and HashiCorp Vault KV v2 out of the box
//! - **Settings Store**: in-memory or PostgreSQL via SQLx
//! - **Encryption**: AES-256-GCM via ring for settings at rest
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use extsecrets::{
//!     config::AppConfig, secrets::SecretsManager, services::SettingsEncryption,
//!     storage::MemorySettingsStore, Result,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let encryption = SettingsEncryption::new(&config.encryption)?;
//!     let manager = SecretsManager::builder(Arc::new(MemorySettingsStore::new()), encryption)
//!         .with_config(config.manager.clone())
//!         .build();
//!
//!     manager.init().await?;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod services;
pub mod storage;

pub use config::AppConfig;
pub use errors::{ExtSecretsError, Result};
pub use secrets::SecretsManager;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "extsecrets");
    }
}

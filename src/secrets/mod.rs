//! External secrets providers and their lifecycle manager.
//!
//! # Architecture
//!
//! Every backend implements [`SecretsProvider`]. A [`ProviderRegistry`] maps
//! provider type names to factories, and the [`SecretsManager`] keeps one
//! live instance per configured provider:
//!
//! - settings for all providers live in one encrypted [`SettingsBundle`]
//!   persisted through a [`crate::storage::SettingsStore`]
//! - providers that fail to init or connect stay in
//!   [`ProviderState::Error`] and are retried with capped exponential backoff
//! - connected providers are refreshed on a fixed interval
//!
//! # Example
//!
//! ```rust,ignore
//! use extsecrets::secrets::SecretsManager;
//! use extsecrets::services::{EncryptionConfig, SettingsEncryption};
//! use extsecrets::storage::MemorySettingsStore;
//! use std::sync::Arc;
//!
//! let encryption = SettingsEncryption::new(&EncryptionConfig::from_env()?)?;
//! let manager = SecretsManager::builder(Arc::new(MemorySettingsStore::new()), encryption).build();
//!
//! manager.init().await?;
//! manager.set_provider_settings("env", settings, None).await?;
//! manager.set_provider_connected("env", true).await?;
//!
//! let password = manager.get_secret("env", "db_password");
//! manager.shutdown().await;
//! ```
//!
//! # Security Considerations
//!
//! - Secret values are handed out as [`SecretString`] and never logged
//! - Provider settings (tokens included) are only persisted encrypted
//! - The environment provider is meant for development

pub mod backends;
pub mod backoff;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod settings;
pub mod types;

pub use backends::{EnvProvider, VaultProvider, VaultProviderConfig};
pub use backoff::{BackoffPolicy, RetryScheduler};
pub use error::{Result, SecretsError};
pub use hooks::{
    FeatureGate, ManagerEvent, NoopTelemetry, StaticFeatureGate, TelemetryEvent, TelemetrySink,
    TracingTelemetry,
};
pub use manager::{
    ProviderTestOutcome, ProviderWithSettings, SecretsManager, SecretsManagerBuilder, TestState,
};
pub use provider::{ProviderState, ProviderStatus, ProviderTest, SecretsProvider};
pub use registry::{ProviderFactory, ProviderRegistry, ProviderRegistryBuilder};
pub use settings::{ProviderSettings, SettingsBundle, SettingsMap};
pub use types::SecretString;

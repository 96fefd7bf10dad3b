//! # Services
//!
//! Supporting services used by the secrets manager.

pub mod secret_encryption;

pub use secret_encryption::{EncryptionConfig, SettingsEncryption};

//! # Error Handling
//!
//! Manager-level errors. Provider-level failures use
//! [`crate::secrets::SecretsError`] and are logged and converted into retries
//! or state, so only storage and decryption failures surface here.

pub mod types;

pub use types::{ExtSecretsError, Result};

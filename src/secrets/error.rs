//! Failures reported by secrets providers.
//!
//! Every provider call (`init`, `connect`, `update`, `test`) reports through
//! [`SecretsError`]. The manager never propagates these: a failed `init` or
//! `connect` becomes an `Error` state plus a retry, a failed `update` is
//! logged, and a failed `test` becomes a test outcome.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SecretsError>;

#[derive(Error, Debug)]
pub enum SecretsError {
    /// Stored settings cannot configure the provider. Raised by `init`;
    /// retrying does not help until the settings change.
    #[error("Invalid provider settings: {message}")]
    Config { message: String },

    /// The backend could not be reached
    #[error("Provider unreachable: {message}")]
    Unreachable { message: String },

    /// The backend rejected the configured credentials
    #[error("Provider rejected credentials: {message}")]
    Unauthorized { message: String },

    /// The backend answered with something the provider cannot use
    #[error("Provider backend failure: {message}")]
    Backend { message: String },

    #[error("Provider internal failure: {message}")]
    Internal { message: String },
}

impl SecretsError {
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::Unreachable { message: message.into() }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether a later attempt with the same settings may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Backend { .. })
    }
}

//! # Error Types
//!
//! Error types for the external secrets manager using `thiserror`.
//!
//! Errors carry rendered messages rather than boxed sources so they can be
//! cloned: every caller attached to a single-flight initialization receives
//! the same error value.

/// Custom result type for manager operations
pub type Result<T> = std::result::Result<T, ExtSecretsError>;

/// Main error type for the external secrets manager
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtSecretsError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The persisted settings blob could not be decrypted or parsed
    #[error("Settings decryption failed: {message}")]
    Decryption { message: String },

    /// The settings bundle could not be encrypted
    #[error("Settings encryption failed: {message}")]
    Encryption { message: String },

    /// Settings store errors (connection, transaction, query)
    #[error("Storage error: {context}: {message}")]
    Storage { context: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}: {message}")]
    Serialization { context: String, message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ExtSecretsError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a decryption error
    pub fn decryption<S: Into<String>>(message: S) -> Self {
        Self::Decryption { message: message.into() }
    }

    /// Create an encryption error
    pub fn encryption<S: Into<String>>(message: S) -> Self {
        Self::Encryption { message: message.into() }
    }

    /// Create a storage error from any displayable source
    pub fn storage<C: Into<String>, E: std::fmt::Display>(context: C, source: E) -> Self {
        Self::Storage { context: context.into(), message: source.to_string() }
    }

    /// Create a serialization error
    pub fn serialization<C: Into<String>>(context: C, source: serde_json::Error) -> Self {
        Self::Serialization { context: context.into(), message: source.to_string() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error came from the persisted settings being unreadable
    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption { .. })
    }

    /// Whether this error came from the settings store
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

impl From<validator::ValidationErrors> for ExtSecretsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(message)
    }
}

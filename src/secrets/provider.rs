//! Provider trait and shared state types
//!
//! Defines the capability contract every external secrets backend implements.

use super::error::Result;
use super::settings::ProviderSettings;
use super::types::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Connection state of a provider instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Uninitialized,
    Connecting,
    Connected,
    Error,
}

impl ProviderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Error => 3,
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lock-free state cell embedded in every provider.
///
/// The manager flips it to [`ProviderState::Error`] after a failed
/// init or connect, so it has to be writable through a shared reference.
#[derive(Debug)]
pub struct ProviderStatus(AtomicU8);

impl ProviderStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(ProviderState::Uninitialized.as_u8()))
    }

    pub fn get(&self) -> ProviderState {
        ProviderState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ProviderState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for ProviderStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a provider self-test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTest {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderTest {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// Trait for external secrets providers
///
/// Implementations must be Send + Sync for use in async contexts. Network
/// timeouts are the implementation's responsibility; the manager never
/// wraps these calls in one.
#[async_trait]
pub trait SecretsProvider: Send + Sync + fmt::Debug {
    /// Registry key and settings key for this provider type
    fn name(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str;

    /// Shared state cell
    fn status(&self) -> &ProviderStatus;

    /// Current connection state
    fn state(&self) -> ProviderState {
        self.status().get()
    }

    /// Apply settings. Must not perform network I/O beyond validation.
    async fn init(&self, settings: &ProviderSettings) -> Result<()>;

    /// Open the connection to the backend
    async fn connect(&self) -> Result<()>;

    /// Release the connection. Called on every teardown path.
    async fn disconnect(&self) -> Result<()>;

    /// Refresh the cached secret values from the backend
    async fn update(&self) -> Result<()>;

    /// Probe the backend with the current settings
    async fn test(&self) -> Result<ProviderTest>;

    /// Look up a cached secret
    fn get_secret(&self, name: &str) -> Option<SecretString>;

    /// Whether a secret is cached under this name
    fn has_secret(&self, name: &str) -> bool {
        self.get_secret(name).is_some()
    }

    /// Names of all cached secrets
    fn secret_names(&self) -> Vec<String>;
}

//! # Configuration Management
//!
//! Environment-driven configuration for the manager, the settings store, the
//! encryption key, and logging. Everything is read once at startup and
//! threaded explicitly into the components that need it.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, ManagerConfig, ObservabilityConfig, DEFAULT_INITIAL_BACKOFF_MS,
    DEFAULT_MAX_BACKOFF_MS, DEFAULT_UPDATE_INTERVAL_SECS,
};

//! # Observability Infrastructure
//!
//! Structured logging for the secrets manager.

pub mod logging;

pub use logging::{init_logging, log_config_info};

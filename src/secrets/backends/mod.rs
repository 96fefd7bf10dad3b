//! Built-in secrets providers

pub mod env;
pub mod vault;

pub use env::EnvProvider;
pub use vault::{VaultProvider, VaultProviderConfig};

//! Environment variable provider.
//!
//! Exposes process environment variables that start with a configured
//! prefix. `APP_SECRET_DB_PASSWORD` with prefix `APP_SECRET_` becomes the
//! secret `db_password`.
//!
//! Environment variables are visible in process listings and have no
//! rotation or audit trail; prefer Vault outside development.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::env;
use std::sync::RwLock;
use tracing::debug;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::provider::{ProviderState, ProviderStatus, ProviderTest, SecretsProvider};
use crate::secrets::settings::ProviderSettings;
use crate::secrets::types::SecretString;

/// Settings key holding the variable prefix
const PREFIX_SETTING: &str = "prefix";

#[derive(Debug, Default)]
pub struct EnvProvider {
    status: ProviderStatus,
    prefix: RwLock<Option<String>>,
    secrets: RwLock<BTreeMap<String, SecretString>>,
}

impl EnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix(&self) -> Option<String> {
        self.prefix.read().ok()?.clone()
    }

    /// Snapshot every variable carrying `prefix`, keyed by lower-cased suffix
    fn scan(prefix: &str) -> BTreeMap<String, SecretString> {
        env::vars()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(prefix)?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_lowercase(), SecretString::new(value)))
            })
            .collect()
    }

    fn reload(&self) -> Result<()> {
        let prefix = self
            .prefix()
            .ok_or_else(|| SecretsError::config_error("env provider has no prefix configured"))?;
        let secrets = Self::scan(&prefix);
        debug!(prefix = %prefix, count = secrets.len(), "Loaded secrets from environment");

        let mut cache = self
            .secrets
            .write()
            .map_err(|_| SecretsError::internal("env provider cache lock poisoned"))?;
        *cache = secrets;
        Ok(())
    }
}

#[async_trait]
impl SecretsProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    fn display_name(&self) -> &'static str {
        "Environment Variables"
    }

    fn status(&self) -> &ProviderStatus {
        &self.status
    }

    async fn init(&self, settings: &ProviderSettings) -> Result<()> {
        let prefix = settings
            .get_str(PREFIX_SETTING)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SecretsError::config_error("env provider requires a non-empty 'prefix'"))?;

        let mut slot = self
            .prefix
            .write()
            .map_err(|_| SecretsError::internal("env provider settings lock poisoned"))?;
        *slot = Some(prefix.to_string());
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.status.set(ProviderState::Connecting);
        self.reload()?;
        self.status.set(ProviderState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Ok(mut cache) = self.secrets.write() {
            cache.clear();
        }
        self.status.set(ProviderState::Uninitialized);
        Ok(())
    }

    async fn update(&self) -> Result<()> {
        self.reload()
    }

    async fn test(&self) -> Result<ProviderTest> {
        match self.prefix() {
            Some(prefix) => {
                debug!(prefix = %prefix, matches = Self::scan(&prefix).len(), "Tested env provider");
                Ok(ProviderTest::ok())
            }
            None => Ok(ProviderTest::failed("No prefix configured")),
        }
    }

    fn get_secret(&self, name: &str) -> Option<SecretString> {
        self.secrets.read().ok()?.get(name).cloned()
    }

    fn secret_names(&self) -> Vec<String> {
        self.secrets.read().map(|s| s.keys().cloned().collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(prefix: &str) -> ProviderSettings {
        let map = json!({ "prefix": prefix }).as_object().cloned().unwrap();
        ProviderSettings::new(map)
    }

    #[tokio::test]
    async fn test_connect_loads_prefixed_variables() {
        env::set_var("EXTSECRETS_TEST_ENV_A_DB_PASSWORD", "hunter2");
        env::set_var("EXTSECRETS_TEST_ENV_A_API_KEY", "abc");
        env::set_var("UNRELATED_EXTSECRETS_VAR", "nope");

        let provider = EnvProvider::new();
        provider.init(&settings("EXTSECRETS_TEST_ENV_A_")).await.unwrap();
        assert_eq!(provider.state(), ProviderState::Uninitialized);

        provider.connect().await.unwrap();
        assert_eq!(provider.state(), ProviderState::Connected);
        assert_eq!(provider.secret_names(), vec!["api_key", "db_password"]);
        assert_eq!(provider.get_secret("db_password").unwrap().expose_secret(), "hunter2");
        assert!(!provider.has_secret("unrelated_extsecrets_var"));

        env::remove_var("EXTSECRETS_TEST_ENV_A_DB_PASSWORD");
        env::remove_var("EXTSECRETS_TEST_ENV_A_API_KEY");
        env::remove_var("UNRELATED_EXTSECRETS_VAR");
    }

    #[tokio::test]
    async fn test_update_picks_up_new_variables() {
        let provider = EnvProvider::new();
        provider.init(&settings("EXTSECRETS_TEST_ENV_B_")).await.unwrap();
        provider.connect().await.unwrap();
        assert!(provider.secret_names().is_empty());

        env::set_var("EXTSECRETS_TEST_ENV_B_TOKEN", "t");
        provider.update().await.unwrap();
        assert!(provider.has_secret("token"));

        provider.disconnect().await.unwrap();
        assert!(provider.secret_names().is_empty());
        assert_eq!(provider.state(), ProviderState::Uninitialized);

        env::remove_var("EXTSECRETS_TEST_ENV_B_TOKEN");
    }

    #[tokio::test]
    async fn test_init_requires_prefix() {
        let provider = EnvProvider::new();
        let err = provider.init(&ProviderSettings::default()).await.unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));

        let result = provider.test().await.unwrap();
        assert!(!result.success);
    }
}

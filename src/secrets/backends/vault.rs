//! HashiCorp Vault provider
//!
//! Reads every entry of a KV v2 mount and exposes each field as a secret
//! named `path.field` (for example `database/primary.password`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::provider::{ProviderState, ProviderStatus, ProviderTest, SecretsProvider};
use crate::secrets::settings::ProviderSettings;
use crate::secrets::types::SecretString;

/// Vault provider settings as stored in the settings bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultProviderConfig {
    /// Vault server address
    pub url: String,
    /// Vault authentication token
    pub token: Option<SecretString>,
    /// Vault namespace (for Enterprise)
    pub namespace: Option<String>,
    /// KV v2 mount path (default: "secret")
    #[serde(default = "default_kv_mount")]
    pub kv_mount_path: String,
}

fn default_kv_mount() -> String {
    "secret".to_string()
}

impl VaultProviderConfig {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let config: Self =
            serde_json::from_value(serde_json::Value::Object(settings.settings.clone()))
                .map_err(|e| SecretsError::config_error(format!("Invalid Vault settings: {}", e)))?;

        if config.url.trim().is_empty() {
            return Err(SecretsError::config_error("Vault url cannot be empty"));
        }
        Ok(config)
    }
}

#[derive(Default)]
pub struct VaultProvider {
    status: ProviderStatus,
    client: RwLock<Option<Arc<VaultClient>>>,
    mount: RwLock<String>,
    secrets: RwLock<BTreeMap<String, SecretString>>,
}

impl std::fmt::Debug for VaultProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProvider")
            .field("state", &self.status.get())
            .field("kv_mount_path", &self.mount_path())
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<Arc<VaultClient>> {
        self.client
            .read()
            .ok()
            .and_then(|c| c.clone())
            .ok_or_else(|| SecretsError::config_error("Vault provider is not initialized"))
    }

    fn mount_path(&self) -> String {
        self.mount.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// Walk the mount breadth-first and return every leaf path
    async fn list_paths(client: &VaultClient, mount: &str) -> Result<Vec<String>> {
        let mut pending = vec![String::new()];
        let mut leaves = Vec::new();

        while let Some(dir) = pending.pop() {
            let keys = match kv2::list(client, mount, &dir).await {
                Ok(keys) => keys,
                Err(ClientError::APIError { code: 404, .. }) => continue,
                Err(e) => return Err(map_client_error("Failed to list Vault secrets", e)),
            };

            for key in keys {
                let path = format!("{}{}", dir, key);
                if key.ends_with('/') {
                    pending.push(path);
                } else {
                    leaves.push(path);
                }
            }
        }

        leaves.sort();
        Ok(leaves)
    }
}

/// Flatten one KV entry into `path.field` secrets; non-string values keep their JSON form
fn flatten_entry(
    path: &str,
    data: HashMap<String, serde_json::Value>,
) -> impl Iterator<Item = (String, SecretString)> + '_ {
    data.into_iter().map(move |(field, value)| {
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        (format!("{}.{}", path, field), SecretString::new(value))
    })
}

fn map_client_error(context: &str, e: ClientError) -> SecretsError {
    match e {
        ClientError::APIError { code: 401 | 403, .. } => {
            SecretsError::authentication_failed(format!("{}: {}", context, e))
        }
        ClientError::RestClientError { .. } => {
            SecretsError::connection_failed(format!("{}: {}", context, e))
        }
        other => SecretsError::backend_error(format!("{}: {}", context, other)),
    }
}

#[async_trait]
impl SecretsProvider for VaultProvider {
    fn name(&self) -> &'static str {
        "vault"
    }

    fn display_name(&self) -> &'static str {
        "HashiCorp Vault"
    }

    fn status(&self) -> &ProviderStatus {
        &self.status
    }

    async fn init(&self, settings: &ProviderSettings) -> Result<()> {
        let config = VaultProviderConfig::from_settings(settings)?;

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.url);

        if let Some(ref token) = config.token {
            settings_builder.token(token.expose_secret());
        }

        if let Some(namespace) = config.namespace.clone() {
            settings_builder.namespace(Some(namespace));
        }

        let client_settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(client_settings).map_err(|e| {
            SecretsError::config_error(format!("Failed to create Vault client: {}", e))
        })?;

        if let Ok(mut slot) = self.client.write() {
            *slot = Some(Arc::new(client));
        }
        if let Ok(mut mount) = self.mount.write() {
            *mount = config.kv_mount_path.clone();
        }

        debug!(address = %config.url, kv_mount = %config.kv_mount_path, "Initialized Vault provider");
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        let client = self.client()?;
        self.status.set(ProviderState::Connecting);

        vaultrs::sys::health(client.as_ref())
            .await
            .map_err(|e| map_client_error("Vault health check failed", e))?;

        self.status.set(ProviderState::Connected);
        info!(kv_mount = %self.mount_path(), "Connected to Vault");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Ok(mut slot) = self.client.write() {
            slot.take();
        }
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.clear();
        }
        self.status.set(ProviderState::Uninitialized);
        Ok(())
    }

    async fn update(&self) -> Result<()> {
        let client = self.client()?;
        let mount = self.mount_path();

        let mut secrets = BTreeMap::new();
        for path in Self::list_paths(&client, &mount).await? {
            match kv2::read::<HashMap<String, serde_json::Value>>(client.as_ref(), &mount, &path).await
            {
                Ok(data) => secrets.extend(flatten_entry(&path, data)),
                Err(e) => warn!(path = %path, error = %e, "Failed to read Vault secret"),
            }
        }

        debug!(kv_mount = %mount, count = secrets.len(), "Refreshed Vault secrets");
        let mut cache = self
            .secrets
            .write()
            .map_err(|_| SecretsError::internal("Vault secret cache lock poisoned"))?;
        *cache = secrets;
        Ok(())
    }

    async fn test(&self) -> Result<ProviderTest> {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return Ok(ProviderTest::failed(e.to_string())),
        };

        if let Err(e) = vaultrs::sys::health(client.as_ref()).await {
            return Ok(ProviderTest::failed(map_client_error("Vault is unreachable", e).to_string()));
        }

        match vaultrs::token::lookup_self(client.as_ref()).await {
            Ok(_) => Ok(ProviderTest::ok()),
            Err(e) => Ok(ProviderTest::failed(map_client_error("Vault token rejected", e).to_string())),
        }
    }

    fn get_secret(&self, name: &str) -> Option<SecretString> {
        self.secrets.read().ok()?.get(name).cloned()
    }

    fn secret_names(&self) -> Vec<String> {
        self.secrets.read().map(|s| s.keys().cloned().collect()).unwrap_or_default()
    }
}

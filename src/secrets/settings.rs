//! Persisted provider settings.
//!
//! The whole [`SettingsBundle`] is the unit that gets encrypted, stored, and
//! cached. The merge helpers here carry the `connected` / `connected_at`
//! preservation rules so the manager and tests share one definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque provider-specific settings (url, token, prefix, ...).
pub type SettingsMap = serde_json::Map<String, serde_json::Value>;

/// Stored configuration for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub connected: bool,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: SettingsMap,
}

impl ProviderSettings {
    pub fn new(settings: SettingsMap) -> Self {
        Self { connected: false, connected_at: None, settings }
    }

    /// Copy of these settings flagged as connected, used for test-before-save.
    pub fn as_connected(&self) -> Self {
        Self { connected: true, ..self.clone() }
    }

    /// Read a string setting.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// All provider settings keyed by provider name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsBundle(BTreeMap<String, ProviderSettings>);

impl SettingsBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderSettings> {
        self.0.get(provider)
    }

    pub fn insert(&mut self, provider: impl Into<String>, settings: ProviderSettings) {
        self.0.insert(provider.into(), settings);
    }

    pub fn is_connected(&self, provider: &str) -> bool {
        self.0.get(provider).is_some_and(|s| s.connected)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProviderSettings)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace a provider's opaque settings, keeping `connected` and
    /// `connected_at`. Returns true when the provider had no entry before.
    pub fn apply_provider_settings(&mut self, provider: &str, settings: SettingsMap) -> bool {
        match self.0.get_mut(provider) {
            Some(existing) => {
                existing.settings = settings;
                false
            }
            None => {
                self.0.insert(provider.to_string(), ProviderSettings::new(settings));
                true
            }
        }
    }

    /// Set the connected flag. Connecting always stamps `connected_at` with
    /// `now`; disconnecting keeps the last stamp.
    pub fn apply_connected(&mut self, provider: &str, connected: bool, now: DateTime<Utc>) {
        let entry = self.0.entry(provider.to_string()).or_default();
        if connected {
            entry.connected_at = Some(now);
        }
        entry.connected = connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn map(value: serde_json::Value) -> SettingsMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_apply_settings_reports_new_provider() {
        let mut bundle = SettingsBundle::new();

        assert!(bundle.apply_provider_settings("vault", map(json!({"url": "http://a"}))));
        assert!(!bundle.apply_provider_settings("vault", map(json!({"url": "http://b"}))));

        let stored = bundle.get("vault").unwrap();
        assert_eq!(stored.get_str("url"), Some("http://b"));
        assert!(!stored.connected);
        assert!(stored.connected_at.is_none());
    }

    #[test]
    fn test_apply_settings_preserves_connection_fields() {
        let mut bundle = SettingsBundle::new();
        let connected_at = Utc::now() - Duration::hours(2);
        bundle.apply_connected("vault", true, connected_at);

        bundle.apply_provider_settings("vault", map(json!({"token": "t"})));

        let stored = bundle.get("vault").unwrap();
        assert!(stored.connected);
        assert_eq!(stored.connected_at, Some(connected_at));
        assert_eq!(stored.get_str("token"), Some("t"));
    }

    #[test]
    fn test_disconnect_keeps_connected_at() {
        let mut bundle = SettingsBundle::new();
        let first = Utc::now() - Duration::minutes(5);
        bundle.apply_connected("env", true, first);
        bundle.apply_connected("env", false, Utc::now());

        let stored = bundle.get("env").unwrap();
        assert!(!stored.connected);
        assert_eq!(stored.connected_at, Some(first));
        assert!(!bundle.is_connected("env"));
    }

    #[test]
    fn test_reconnecting_restamps_connected_at() {
        let mut bundle = SettingsBundle::new();
        let first = Utc::now() - Duration::minutes(5);
        bundle.apply_connected("env", true, first);

        let second = Utc::now();
        bundle.apply_connected("env", true, second);
        assert_eq!(bundle.get("env").unwrap().connected_at, Some(second));

        bundle.apply_connected("env", false, Utc::now() + Duration::minutes(1));
        assert_eq!(bundle.get("env").unwrap().connected_at, Some(second));
    }

    #[test]
    fn test_bundle_json_shape() {
        let mut bundle = SettingsBundle::new();
        bundle.apply_provider_settings("env", map(json!({"prefix": "APP_"})));

        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(
            value,
            json!({"env": {"connected": false, "connectedAt": null, "settings": {"prefix": "APP_"}}})
        );

        let parsed: SettingsBundle =
            serde_json::from_value(json!({"env": {"connected": true}})).unwrap();
        assert!(parsed.is_connected("env"));
        assert!(parsed.get("env").unwrap().settings.is_empty());
    }
}

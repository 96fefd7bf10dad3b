//! Common test utilities for all integration tests.
//!
//! Provides a scriptable mock provider, instrumented settings stores, a
//! recording telemetry sink, and manager construction helpers.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod mock_provider;
pub mod stores;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extsecrets::config::ManagerConfig;
use extsecrets::secrets::{
    ProviderRegistry, ProviderSettings, SecretsManager, SecretsProvider, SettingsBundle,
    SettingsMap, StaticFeatureGate, TelemetryEvent, TelemetrySink,
};
use extsecrets::services::{EncryptionConfig, SettingsEncryption};
use extsecrets::storage::SettingsStore;

pub use mock_provider::{MockProbe, MockProvider};
pub use stores::InstrumentedStore;

pub const TEST_KEY: [u8; 32] = [42u8; 32];

pub fn encryption() -> SettingsEncryption {
    encryption_with_key(TEST_KEY)
}

pub fn encryption_with_key(key: [u8; 32]) -> SettingsEncryption {
    SettingsEncryption::new(&EncryptionConfig::from_key_bytes(key))
        .expect("test key should be accepted")
}

/// Short timings so retry tests run in a few virtual seconds
pub fn fast_config() -> ManagerConfig {
    ManagerConfig { update_interval_secs: 60, initial_backoff_ms: 1_000, max_backoff_ms: 4_000 }
}

pub fn settings_map(value: serde_json::Value) -> SettingsMap {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Encrypted blob holding one entry per `(name, connected)` pair
pub fn seeded_blob(entries: &[(&str, bool)]) -> String {
    let mut bundle = SettingsBundle::new();
    for (name, connected) in entries {
        let mut settings = ProviderSettings::new(settings_map(serde_json::json!({ "token": "t" })));
        if *connected {
            settings.connected = true;
            settings.connected_at = Some(chrono::Utc::now());
        }
        bundle.insert(*name, settings);
    }
    encryption().encrypt_bundle(&bundle).expect("bundle should encrypt")
}

pub fn mock_registry(entries: &[(&'static str, Arc<MockProbe>)]) -> ProviderRegistry {
    entries
        .iter()
        .fold(ProviderRegistry::builder(), |builder, (name, probe)| {
            let name = *name;
            let probe = Arc::clone(probe);
            builder.register(name, move || {
                Arc::new(MockProvider::new(name, Arc::clone(&probe))) as Arc<dyn SecretsProvider>
            })
        })
        .build()
}

/// Everything a manager test needs to poke at
pub struct Harness<S = InstrumentedStore> {
    pub manager: Arc<SecretsManager>,
    pub store: Arc<S>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub gate: Arc<StaticFeatureGate>,
}

pub fn harness(store: InstrumentedStore, providers: &[(&'static str, Arc<MockProbe>)]) -> Harness {
    harness_with_store(Arc::new(store), providers)
}

pub fn harness_with_store<S>(store: Arc<S>, providers: &[(&'static str, Arc<MockProbe>)]) -> Harness<S>
where
    S: SettingsStore + 'static,
{
    let telemetry = Arc::new(RecordingTelemetry::default());
    let gate = Arc::new(StaticFeatureGate::new(true));

    let manager = SecretsManager::builder(Arc::clone(&store) as Arc<dyn SettingsStore>, encryption())
        .with_registry(mock_registry(providers))
        .with_config(fast_config())
        .with_feature_gate(Arc::clone(&gate) as _)
        .with_telemetry(Arc::clone(&telemetry) as _)
        .build();

    Harness { manager, store, telemetry, gate }
}

/// Telemetry sink that keeps every event for later inspection
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Poll until at least `count` events arrived
    pub async fn wait_for(&self, count: usize) -> Vec<TelemetryEvent> {
        for _ in 0..500 {
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} telemetry events, got {:?}", count, self.events());
    }
}

#[async_trait]
impl TelemetrySink for RecordingTelemetry {
    async fn track(&self, event: TelemetryEvent) -> Result<(), String> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Let spawned background work (disconnects, telemetry) run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

//! Host integration points: feature gate, telemetry, change events.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Licensing / feature switch consulted before refreshing secrets
pub trait FeatureGate: Send + Sync + std::fmt::Debug {
    fn is_enabled(&self) -> bool;
}

/// Feature gate backed by a flag the host can flip at runtime
#[derive(Debug)]
pub struct StaticFeatureGate(AtomicBool);

impl StaticFeatureGate {
    pub fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}

impl Default for StaticFeatureGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FeatureGate for StaticFeatureGate {
    fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Analytics events emitted by the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    ProviderSettingsSaved {
        provider: String,
        is_new: bool,
        is_valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
}

/// Sink for telemetry events. Failures are logged and dropped by the caller.
#[async_trait]
pub trait TelemetrySink: Send + Sync + std::fmt::Debug {
    async fn track(&self, event: TelemetryEvent) -> Result<(), String>;
}

/// Writes telemetry events to the log
#[derive(Debug, Default)]
pub struct TracingTelemetry;

#[async_trait]
impl TelemetrySink for TracingTelemetry {
    async fn track(&self, event: TelemetryEvent) -> Result<(), String> {
        match &event {
            TelemetryEvent::ProviderSettingsSaved { provider, is_new, is_valid, error_message, .. } => {
                info!(
                    provider = %provider,
                    is_new = *is_new,
                    is_valid = *is_valid,
                    error = error_message.as_deref().unwrap_or(""),
                    "External secrets provider settings saved"
                );
            }
        }
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn track(&self, _event: TelemetryEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Change notifications for hosts running several manager instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Persisted settings for `provider` changed; peers should reload it
    ProviderSettingsChanged { provider: String },
}

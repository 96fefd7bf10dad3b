//! External secrets manager
//!
//! Owns the live provider instances, the decrypted settings cache, the
//! periodic refresh loop, and per-provider retry timers.
//!
//! Provider failures never escape this type: they are logged and turned into
//! a scheduled retry, an `Error` state, or a test result. Only settings
//! storage and decryption failures are returned to callers.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::backoff::RetryScheduler;
use super::error::SecretsError;
use super::hooks::{
    FeatureGate, ManagerEvent, StaticFeatureGate, TelemetryEvent, TelemetrySink, TracingTelemetry,
};
use super::provider::{ProviderState, SecretsProvider};
use super::registry::ProviderRegistry;
use super::settings::{ProviderSettings, SettingsBundle, SettingsMap};
use super::types::SecretString;
use crate::config::ManagerConfig;
use crate::errors::{ExtSecretsError, Result};
use crate::services::SettingsEncryption;
use crate::storage::SettingsStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Classification of a test-before-save run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    /// Construction failed or the test did not pass
    Error,
    /// Settings work but the provider is not the connected one
    Tested,
    /// Settings work and the provider is already marked connected
    Connected,
}

/// Result of [`SecretsManager::test_provider_settings`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTestOutcome {
    pub success: bool,
    pub state: TestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderTestOutcome {
    fn error(message: Option<String>) -> Self {
        Self { success: false, state: TestState::Error, error: message }
    }
}

/// A provider instance paired with its stored settings
#[derive(Debug, Clone)]
pub struct ProviderWithSettings {
    pub provider: Arc<dyn SecretsProvider>,
    pub settings: ProviderSettings,
}

enum InitState {
    Idle,
    Running(watch::Receiver<Option<Result<()>>>),
    Ready,
}

/// Bumped by every shutdown. Work started under an older epoch must not
/// publish providers, schedule retries, or start the refresh loop.
#[derive(Debug, Default)]
struct Lifecycle {
    epoch: u64,
    refresh: Option<CancellationToken>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for [`SecretsManager`]
pub struct SecretsManagerBuilder {
    store: Arc<dyn SettingsStore>,
    encryption: SettingsEncryption,
    registry: ProviderRegistry,
    config: ManagerConfig,
    feature_gate: Arc<dyn FeatureGate>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl SecretsManagerBuilder {
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_feature_gate(mut self, gate: Arc<dyn FeatureGate>) -> Self {
        self.feature_gate = gate;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn build(self) -> Arc<SecretsManager> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|this| SecretsManager {
            this: this.clone(),
            store: self.store,
            encryption: self.encryption,
            registry: self.registry,
            config: self.config,
            feature_gate: self.feature_gate,
            telemetry: self.telemetry,
            providers: DashMap::new(),
            cached_settings: RwLock::new(SettingsBundle::new()),
            retries: RetryScheduler::new(),
            init_state: tokio::sync::Mutex::new(InitState::Idle),
            initialized: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
            events,
        })
    }
}

/// Lifecycle manager for external secrets providers
pub struct SecretsManager {
    this: Weak<SecretsManager>,
    store: Arc<dyn SettingsStore>,
    encryption: SettingsEncryption,
    registry: ProviderRegistry,
    config: ManagerConfig,
    feature_gate: Arc<dyn FeatureGate>,
    telemetry: Arc<dyn TelemetrySink>,
    providers: DashMap<String, Arc<dyn SecretsProvider>>,
    cached_settings: RwLock<SettingsBundle>,
    retries: RetryScheduler,
    init_state: tokio::sync::Mutex<InitState>,
    initialized: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    events: broadcast::Sender<ManagerEvent>,
}

impl std::fmt::Debug for SecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManager")
            .field("providers", &self.provider_names())
            .field("initialized", &self.is_initialized())
            .field("pending_retries", &self.retries.pending_count())
            .field("registry", &self.registry)
            .finish()
    }
}

impl SecretsManager {
    /// Start building a manager around a settings store and the process key.
    /// Defaults: built-in providers, default timings, feature enabled,
    /// telemetry written to the log.
    pub fn builder(
        store: Arc<dyn SettingsStore>,
        encryption: SettingsEncryption,
    ) -> SecretsManagerBuilder {
        SecretsManagerBuilder {
            store,
            encryption,
            registry: ProviderRegistry::builtin(),
            config: ManagerConfig::default(),
            feature_gate: Arc::new(StaticFeatureGate::default()),
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    fn strong(&self) -> Result<Arc<Self>> {
        self.this.upgrade().ok_or_else(|| ExtSecretsError::internal("Secrets manager was dropped"))
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn epoch(&self) -> u64 {
        self.lifecycle().epoch
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Registry this manager constructs providers from
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Change notifications emitted after every settings mutation
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Load settings, start every configured provider, and start the refresh loop.
    ///
    /// Concurrent callers share a single run and all receive its outcome.
    /// A failed run leaves the manager uninitialized so `init` can be retried.
    pub async fn init(&self) -> Result<()> {
        let mut outcome = {
            let mut state = self.init_state.lock().await;
            match &*state {
                InitState::Ready => return Ok(()),
                InitState::Running(rx) => rx.clone(),
                InitState::Idle => {
                    let manager = self.strong()?;
                    let epoch = self.epoch();
                    let (tx, rx) = watch::channel(None);
                    *state = InitState::Running(rx.clone());

                    tokio::spawn(async move {
                        let result = manager.internal_init(epoch).await;
                        {
                            let mut state = manager.init_state.lock().await;
                            *state = if result.is_ok() { InitState::Ready } else { InitState::Idle };
                        }
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };

        match result {
            Some(result) => result,
            None => {
                let mut state = self.init_state.lock().await;
                if matches!(*state, InitState::Running(_)) {
                    *state = InitState::Idle;
                }
                Err(ExtSecretsError::internal("Initialization task ended without a result"))
            }
        }
    }

    #[instrument(skip(self), name = "secrets_manager_init")]
    async fn internal_init(&self, epoch: u64) -> Result<()> {
        let bundle = self.load_settings().await?;
        let backoff = self.config.backoff().initial();

        let started = join_all(bundle.iter().map(|(name, settings)| async move {
            let provider = self.init_provider(name, settings, backoff, epoch).await;
            (name.clone(), provider)
        }))
        .await;

        self.publish_settings(bundle.clone());
        for (name, provider) in started.into_iter().filter_map(|(n, p)| Some((n, p?))) {
            match self.install_provider(&name, provider, epoch) {
                Ok(Some(displaced)) => disconnect_quietly(&name, displaced.as_ref()).await,
                Ok(None) => {}
                Err(rejected) => disconnect_quietly(&name, rejected.as_ref()).await,
            }
        }

        self.update_secrets().await;
        if !self.go_live(epoch) {
            warn!("Shutdown during initialization, discarding started providers");
            return Err(ExtSecretsError::internal("Initialization cancelled by shutdown"));
        }

        info!(
            configured = bundle.len(),
            active = self.providers.len(),
            "External secrets manager initialized"
        );
        Ok(())
    }

    async fn load_settings(&self) -> Result<SettingsBundle> {
        match self.store.get_encrypted_settings().await? {
            Some(blob) => self.encryption.decrypt_bundle(&blob),
            None => {
                debug!("No external secrets settings stored yet");
                Ok(SettingsBundle::new())
            }
        }
    }

    /// Mark the manager initialized and start the refresh loop, unless a
    /// shutdown happened since `epoch`.
    fn go_live(&self, epoch: u64) -> bool {
        let token = CancellationToken::new();
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.epoch != epoch {
                return false;
            }
            if let Some(previous) = lifecycle.refresh.replace(token.clone()) {
                previous.cancel();
            }
            self.initialized.store(true, Ordering::Release);
        }
        self.start_refresh_loop(token);
        true
    }

    /// Insert a live provider unless a shutdown happened since `epoch`.
    ///
    /// On success returns the displaced instance, if any. A rejected
    /// provider is handed back. Either way the caller disconnects it.
    fn install_provider(
        &self,
        name: &str,
        provider: Arc<dyn SecretsProvider>,
        epoch: u64,
    ) -> std::result::Result<Option<Arc<dyn SecretsProvider>>, Arc<dyn SecretsProvider>> {
        let lifecycle = self.lifecycle();
        if lifecycle.epoch != epoch {
            return Err(provider);
        }
        Ok(self.providers.insert(name.to_string(), provider))
    }

    fn start_refresh_loop(&self, token: CancellationToken) {
        let manager = self.this.clone();
        let period = self.config.update_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.update_secrets().await;
                    }
                }
            }
            debug!("Secrets refresh loop stopped");
        });
    }

    // ------------------------------------------------------------------
    // Provider construction and retry
    // ------------------------------------------------------------------

    /// Construct a provider and run init, then connect when the settings say so.
    ///
    /// Returns `None` for an unknown type name. Otherwise the instance is
    /// returned together with the first failure; a failed instance has
    /// already been disconnected and forced into `Error`.
    async fn start_provider(
        &self,
        name: &str,
        settings: &ProviderSettings,
    ) -> Option<(Arc<dyn SecretsProvider>, std::result::Result<(), SecretsError>)> {
        let Some(provider) = self.registry.create(name) else {
            debug!(provider = %name, "Skipping provider type that is not registered");
            return None;
        };

        if let Err(e) = provider.init(settings).await {
            provider.status().set(ProviderState::Error);
            return Some((provider, Err(e)));
        }

        if settings.connected {
            if let Err(e) = provider.connect().await {
                disconnect_quietly(name, provider.as_ref()).await;
                provider.status().set(ProviderState::Error);
                return Some((provider, Err(e)));
            }
        }

        Some((provider, Ok(())))
    }

    async fn init_provider(
        &self,
        name: &str,
        settings: &ProviderSettings,
        backoff: Duration,
        epoch: u64,
    ) -> Option<Arc<dyn SecretsProvider>> {
        let (provider, started) = self.start_provider(name, settings).await?;

        if let Err(e) = started {
            error!(
                provider = %name,
                error = %e,
                transient = e.is_transient(),
                "Failed to start external secrets provider"
            );
            self.schedule_retry(name, backoff, epoch);
        }
        Some(provider)
    }

    fn schedule_retry(&self, name: &str, delay: Duration, epoch: u64) {
        let manager = self.this.clone();
        let provider = name.to_string();
        let span = crate::provider_span!("retry", name, delay_ms = millis(delay));

        // Held across scheduling so shutdown's cancel_all sees this timer
        let lifecycle = self.lifecycle();
        if lifecycle.epoch != epoch {
            debug!(provider = %name, "Manager shut down, not scheduling retry");
            return;
        }
        self.retries.schedule(name, delay, move || {
            async move {
                if let Some(manager) = manager.upgrade() {
                    manager.retry_provider(&provider, delay, epoch).await;
                }
            }
            .instrument(span)
        });
    }

    async fn retry_provider(&self, name: &str, waited: Duration, epoch: u64) {
        if let Some(provider) = self.get_provider(name) {
            if provider.state() != ProviderState::Error {
                debug!(provider = %name, state = %provider.state(), "Provider recovered, skipping retry");
                return;
            }
        }

        let next = self.config.backoff().next(waited);
        info!(provider = %name, next_backoff_ms = millis(next), "Retrying external secrets provider");
        self.reload_provider_with_backoff(name, next, epoch).await;
    }

    /// Number of providers waiting on a retry timer
    pub fn pending_retries(&self) -> usize {
        self.retries.pending_count()
    }

    /// Whether `name` has a retry timer pending
    pub fn has_pending_retry(&self, name: &str) -> bool {
        self.retries.is_pending(name)
    }

    /// Delay the pending retry for `name` was scheduled with
    pub fn pending_retry_delay(&self, name: &str) -> Option<Duration> {
        self.retries.pending_delay(name)
    }

    // ------------------------------------------------------------------
    // Reload
    // ------------------------------------------------------------------

    /// Tear down and rebuild one provider from the cached settings
    pub async fn reload_provider(&self, name: &str) {
        self.reload_provider_with_backoff(name, self.config.backoff().initial(), self.epoch()).await;
    }

    /// Reload every live provider in turn
    pub async fn reload_all_providers(&self) {
        for name in self.provider_names() {
            self.reload_provider(&name).await;
        }
    }

    #[instrument(skip(self), fields(provider = %name, backoff_ms = millis(backoff)))]
    async fn reload_provider_with_backoff(&self, name: &str, backoff: Duration, epoch: u64) {
        if self.epoch() != epoch {
            debug!(provider = %name, "Manager shut down, skipping reload");
            return;
        }
        if let Some((_, previous)) = self.providers.remove(name) {
            disconnect_quietly(name, previous.as_ref()).await;
        }

        let settings = self.cached_provider_settings(name).unwrap_or_default();
        let Some(provider) = self.init_provider(name, &settings, backoff, epoch).await else {
            return;
        };

        match self.install_provider(name, provider, epoch) {
            Ok(displaced) => {
                if let Some(displaced) = displaced {
                    disconnect_quietly(name, displaced.as_ref()).await;
                }
                debug!(provider = %name, "Provider reloaded");
            }
            Err(rejected) => {
                debug!(provider = %name, "Manager shut down during reload, discarding provider");
                disconnect_quietly(name, rejected.as_ref()).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Refresh every connected provider concurrently
    #[instrument(skip(self), name = "update_secrets")]
    pub async fn update_secrets(&self) {
        if !self.feature_gate.is_enabled() {
            debug!("External secrets disabled, skipping refresh");
            return;
        }

        let settings = self.settings_snapshot();
        let targets: Vec<(String, Arc<dyn SecretsProvider>)> = self
            .providers
            .iter()
            .filter(|entry| {
                settings.is_connected(entry.key()) && entry.value().state() == ProviderState::Connected
            })
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        join_all(targets.iter().map(|(name, provider)| async move {
            if let Err(e) = provider.update().await {
                warn!(provider = %name, error = %e, "Failed to update secrets from provider");
            }
        }))
        .await;
    }

    /// Refresh a single provider on demand.
    ///
    /// Returns false when the feature is disabled, the provider is absent or
    /// not connected, or the update failed.
    #[instrument(skip(self), fields(provider = %name))]
    pub async fn update_provider(&self, name: &str) -> bool {
        if !self.feature_gate.is_enabled() {
            return false;
        }
        let Some(provider) = self.get_provider(name) else {
            return false;
        };
        if provider.state() != ProviderState::Connected {
            return false;
        }

        match provider.update().await {
            Ok(()) => true,
            Err(e) => {
                warn!(provider = %name, error = %e, "Manual provider update failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Settings mutation
    // ------------------------------------------------------------------

    /// Replace a provider's settings, keeping its connected flag, then reload it
    #[instrument(skip(self, data, user_id), fields(provider = %name))]
    pub async fn set_provider_settings(
        &self,
        name: &str,
        data: SettingsMap,
        user_id: Option<String>,
    ) -> Result<()> {
        let is_new = self.mutate_settings(|bundle| bundle.apply_provider_settings(name, data)).await?;

        self.reload_provider(name).await;
        self.announce(name);
        self.track_provider_save(name, is_new, user_id);
        Ok(())
    }

    /// Mark a provider connected or disconnected, reload it, and refresh secrets
    #[instrument(skip(self), fields(provider = %name))]
    pub async fn set_provider_connected(&self, name: &str, connected: bool) -> Result<()> {
        let now = Utc::now();
        self.mutate_settings(|bundle| bundle.apply_connected(name, connected, now)).await?;

        self.reload_provider(name).await;
        self.update_secrets().await;
        self.announce(name);
        Ok(())
    }

    /// Read-modify-write of the persisted bundle inside one store transaction.
    /// The cache is replaced only after the commit succeeds.
    async fn mutate_settings<F, R>(&self, apply: F) -> Result<R>
    where
        F: FnOnce(&mut SettingsBundle) -> R + Send,
        R: Send,
    {
        let mut tx = self.store.begin().await?;

        let mut bundle = match tx.get_encrypted_settings().await? {
            Some(blob) => self.encryption.decrypt_bundle(&blob)?,
            None => SettingsBundle::new(),
        };
        let result = apply(&mut bundle);

        let blob = self.encryption.encrypt_bundle(&bundle)?;
        tx.save_encrypted_settings(blob).await?;
        tx.commit().await?;

        self.publish_settings(bundle);
        Ok(result)
    }

    fn announce(&self, name: &str) {
        let _ = self.events.send(ManagerEvent::ProviderSettingsChanged { provider: name.to_string() });
    }

    fn track_provider_save(&self, name: &str, is_new: bool, user_id: Option<String>) {
        let provider = self.get_provider(name);
        let telemetry = Arc::clone(&self.telemetry);
        let name = name.to_string();

        tokio::spawn(async move {
            let (is_valid, error_message) = match provider {
                Some(provider) => match AssertUnwindSafe(provider.test()).catch_unwind().await {
                    Ok(Ok(result)) => (result.success, result.error),
                    Ok(Err(e)) => (false, Some(e.to_string())),
                    Err(_) => (false, Some("provider test panicked".to_string())),
                },
                None => (false, None),
            };

            let event = TelemetryEvent::ProviderSettingsSaved {
                provider: name.clone(),
                is_new,
                is_valid,
                error_message,
                user_id,
            };
            if let Err(e) = telemetry.track(event).await {
                debug!(provider = %name, error = %e, "Dropping telemetry event");
            }
        });
    }

    // ------------------------------------------------------------------
    // Test-before-save
    // ------------------------------------------------------------------

    /// Try candidate settings on a throwaway instance.
    ///
    /// Touches neither the stored settings, the live providers, nor the
    /// retry timers. The throwaway is always disconnected afterwards.
    #[instrument(skip(self, data), fields(provider = %name))]
    pub async fn test_provider_settings(&self, name: &str, data: SettingsMap) -> ProviderTestOutcome {
        let candidate = ProviderSettings::new(data).as_connected();

        let Some((provider, started)) = self.start_provider(name, &candidate).await else {
            return ProviderTestOutcome::error(None);
        };

        let outcome = match started {
            Err(e) => ProviderTestOutcome::error(Some(e.to_string())),
            Ok(()) => match AssertUnwindSafe(provider.test()).catch_unwind().await {
                Ok(Ok(result)) => self.classify(name, result.success, result.error),
                Ok(Err(e)) => ProviderTestOutcome::error(Some(e.to_string())),
                Err(_) => {
                    error!(provider = %name, "Provider test panicked");
                    ProviderTestOutcome::error(Some("provider test panicked".to_string()))
                }
            },
        };

        disconnect_quietly(name, provider.as_ref()).await;
        outcome
    }

    fn classify(&self, name: &str, success: bool, error: Option<String>) -> ProviderTestOutcome {
        let state = if !success {
            TestState::Error
        } else if self.settings_snapshot().is_connected(name) {
            TestState::Connected
        } else {
            TestState::Tested
        };
        ProviderTestOutcome { success, state, error }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn SecretsProvider>> {
        self.providers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Names of live providers, sorted
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn get_secret(&self, provider: &str, name: &str) -> Option<SecretString> {
        self.get_provider(provider)?.get_secret(name)
    }

    pub fn has_secret(&self, provider: &str, name: &str) -> bool {
        self.get_provider(provider).is_some_and(|p| p.has_secret(name))
    }

    /// Secret names of one provider, `None` when it is not live
    pub fn secret_names(&self, provider: &str) -> Option<Vec<String>> {
        self.get_provider(provider).map(|p| p.secret_names())
    }

    /// Secret names of every live provider
    pub fn all_secret_names(&self) -> BTreeMap<String, Vec<String>> {
        self.providers.iter().map(|e| (e.key().clone(), e.value().secret_names())).collect()
    }

    /// Live instance and stored settings for a registered provider type.
    ///
    /// Falls back to a fresh unconnected instance and default settings, so
    /// every registered type is visible whether configured or not.
    pub fn provider_with_settings(&self, name: &str) -> Option<ProviderWithSettings> {
        let provider = self.get_provider(name).or_else(|| self.registry.create(name))?;
        let settings = self.cached_provider_settings(name).unwrap_or_default();
        Some(ProviderWithSettings { provider, settings })
    }

    /// [`Self::provider_with_settings`] for every registered provider type
    pub fn providers_with_settings(&self) -> Vec<ProviderWithSettings> {
        self.registry.names().filter_map(|name| self.provider_with_settings(name)).collect()
    }

    /// Copy of the cached settings bundle
    pub fn settings_snapshot(&self) -> SettingsBundle {
        self.cached_settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn cached_provider_settings(&self, name: &str) -> Option<ProviderSettings> {
        self.cached_settings.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    fn publish_settings(&self, bundle: SettingsBundle) {
        *self.cached_settings.write().unwrap_or_else(PoisonError::into_inner) = bundle;
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Stop the refresh loop, cancel retries, and disconnect every provider.
    ///
    /// Disconnects run in the background. Safe to call repeatedly and before
    /// `init`; `init` may be called again afterwards. An `init` or retry still
    /// in flight discards what it built instead of publishing it.
    pub async fn shutdown(&self) {
        let token = {
            let mut lifecycle = self.lifecycle();
            lifecycle.epoch += 1;
            self.initialized.store(false, Ordering::Release);
            lifecycle.refresh.take()
        };
        if let Some(token) = token {
            token.cancel();
        }

        self.retries.cancel_all();

        for name in self.provider_names() {
            if let Some((name, provider)) = self.providers.remove(&name) {
                tokio::spawn(async move {
                    disconnect_quietly(&name, provider.as_ref()).await;
                });
            }
        }

        let mut state = self.init_state.lock().await;
        if matches!(*state, InitState::Ready) {
            *state = InitState::Idle;
        }
        info!("External secrets manager shut down");
    }
}

/// Best-effort disconnect; failures are only logged
async fn disconnect_quietly(name: &str, provider: &dyn SecretsProvider) {
    if let Err(e) = provider.disconnect().await {
        debug!(provider = %name, error = %e, "Ignoring provider disconnect failure");
    }
}

//! Scriptable provider whose instances share a probe, so a test can count
//! calls and flip failure knobs across reloads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extsecrets::secrets::{
    ProviderSettings, ProviderState, ProviderStatus, ProviderTest, SecretString, SecretsError,
    SecretsProvider,
};
use tokio::time::Instant;

type ProviderResult<T> = Result<T, SecretsError>;

#[derive(Debug, Default)]
pub struct MockProbe {
    pub created: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub test_calls: AtomicUsize,

    pub fail_init: AtomicBool,
    pub fail_connect: AtomicBool,
    pub fail_update: AtomicBool,
    /// `test` resolves to an unsuccessful result
    pub fail_test: AtomicBool,
    /// `test` returns an error
    pub error_in_test: AtomicBool,
    pub panic_in_test: AtomicBool,
    pub init_delay_ms: AtomicU64,

    init_times: Mutex<Vec<Instant>>,
}

impl MockProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_init() -> Arc<Self> {
        let probe = Self::new();
        probe.fail_init.store(true, Ordering::SeqCst);
        probe
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn tests(&self) -> usize {
        self.test_calls.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    /// Gaps between consecutive `init` calls
    pub fn init_gaps(&self) -> Vec<Duration> {
        let times = self.init_times.lock().unwrap();
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

#[derive(Debug)]
pub struct MockProvider {
    name: &'static str,
    status: ProviderStatus,
    probe: Arc<MockProbe>,
    secrets: Mutex<BTreeMap<String, String>>,
}

impl MockProvider {
    pub fn new(name: &'static str, probe: Arc<MockProbe>) -> Self {
        probe.created.fetch_add(1, Ordering::SeqCst);
        Self { name, status: ProviderStatus::new(), probe, secrets: Mutex::new(BTreeMap::new()) }
    }
}

#[async_trait]
impl SecretsProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    fn status(&self) -> &ProviderStatus {
        &self.status
    }

    async fn init(&self, _settings: &ProviderSettings) -> ProviderResult<()> {
        self.probe.init_times.lock().unwrap().push(Instant::now());
        self.probe.init_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.probe.init_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.probe.fail_init.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("mock init refused"));
        }
        Ok(())
    }

    async fn connect(&self) -> ProviderResult<()> {
        self.probe.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_connect.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("mock backend unreachable"));
        }
        self.status.set(ProviderState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        self.probe.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.status.set(ProviderState::Uninitialized);
        Ok(())
    }

    async fn update(&self) -> ProviderResult<()> {
        let count = self.probe.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.probe.fail_update.load(Ordering::SeqCst) {
            return Err(SecretsError::backend_error("mock update failed"));
        }
        self.secrets.lock().unwrap().insert("token".to_string(), format!("value-{}", count));
        Ok(())
    }

    async fn test(&self) -> ProviderResult<ProviderTest> {
        self.probe.test_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.panic_in_test.load(Ordering::SeqCst) {
            panic!("mock test exploded");
        }
        if self.probe.error_in_test.load(Ordering::SeqCst) {
            return Err(SecretsError::authentication_failed("mock token rejected"));
        }
        if self.probe.fail_test.load(Ordering::SeqCst) {
            return Ok(ProviderTest::failed("bad credentials"));
        }
        Ok(ProviderTest::ok())
    }

    fn get_secret(&self, name: &str) -> Option<SecretString> {
        self.secrets.lock().unwrap().get(name).map(|value| SecretString::new(value.clone()))
    }

    fn secret_names(&self) -> Vec<String> {
        self.secrets.lock().unwrap().keys().cloned().collect()
    }
}

//! Settings store wrapper that counts reads and can fail commits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use extsecrets::storage::{MemorySettingsStore, SettingsStore, SettingsTransaction};
use extsecrets::{ExtSecretsError, Result};

#[derive(Debug, Default)]
pub struct InstrumentedStore {
    inner: MemorySettingsStore,
    reads: AtomicUsize,
    pub fail_commit: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(blob: impl Into<String>) -> Self {
        Self { inner: MemorySettingsStore::with_value(blob), ..Self::default() }
    }

    /// Non-transactional reads, i.e. settings loads during `init`
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Current committed blob
    pub async fn raw(&self) -> Option<String> {
        self.inner.get_encrypted_settings().await.unwrap()
    }
}

#[async_trait]
impl SettingsStore for InstrumentedStore {
    async fn get_encrypted_settings(&self) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_encrypted_settings().await
    }

    async fn save_encrypted_settings(&self, blob: String) -> Result<()> {
        self.inner.save_encrypted_settings(blob).await
    }

    async fn begin(&self) -> Result<Box<dyn SettingsTransaction>> {
        let tx = self.inner.begin().await?;
        if self.fail_commit.load(Ordering::SeqCst) {
            return Ok(Box::new(FailingCommit { inner: tx }));
        }
        Ok(tx)
    }
}

/// Behaves like the wrapped transaction until commit, which rolls back
struct FailingCommit {
    inner: Box<dyn SettingsTransaction>,
}

#[async_trait]
impl SettingsTransaction for FailingCommit {
    async fn get_encrypted_settings(&mut self) -> Result<Option<String>> {
        self.inner.get_encrypted_settings().await
    }

    async fn save_encrypted_settings(&mut self, blob: String) -> Result<()> {
        self.inner.save_encrypted_settings(blob).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        drop(self.inner);
        Err(ExtSecretsError::storage("Failed to commit settings transaction", "connection reset"))
    }
}

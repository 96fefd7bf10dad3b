//! Settings store contract and the in-memory implementation.
//!
//! The store only ever sees the encrypted blob. A transaction isolates a
//! read-modify-write of that blob from other writers; dropping a
//! transaction without calling [`SettingsTransaction::commit`] discards
//! its writes.

use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Persistence for the encrypted settings bundle
#[async_trait]
pub trait SettingsStore: Send + Sync + std::fmt::Debug {
    /// Read the stored blob, `None` on first run
    async fn get_encrypted_settings(&self) -> Result<Option<String>>;

    /// Overwrite the stored blob outside of a transaction
    async fn save_encrypted_settings(&self, blob: String) -> Result<()>;

    /// Open an isolated read-modify-write transaction
    async fn begin(&self) -> Result<Box<dyn SettingsTransaction>>;
}

/// Transaction-scoped view of the settings blob
#[async_trait]
pub trait SettingsTransaction: Send {
    async fn get_encrypted_settings(&mut self) -> Result<Option<String>>;

    async fn save_encrypted_settings(&mut self, blob: String) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Process-local store used when no database is configured
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    value: Arc<Mutex<Option<String>>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with an encrypted blob
    pub fn with_value(blob: impl Into<String>) -> Self {
        Self { value: Arc::new(Mutex::new(Some(blob.into()))) }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_encrypted_settings(&self) -> Result<Option<String>> {
        Ok(self.value.lock().await.clone())
    }

    async fn save_encrypted_settings(&self, blob: String) -> Result<()> {
        *self.value.lock().await = Some(blob);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn SettingsTransaction>> {
        let guard = Arc::clone(&self.value).lock_owned().await;
        Ok(Box::new(MemoryTransaction { guard, staged: None }))
    }
}

/// Holds the store lock until commit or drop
struct MemoryTransaction {
    guard: OwnedMutexGuard<Option<String>>,
    staged: Option<String>,
}

#[async_trait]
impl SettingsTransaction for MemoryTransaction {
    async fn get_encrypted_settings(&mut self) -> Result<Option<String>> {
        Ok(self.staged.clone().or_else(|| self.guard.clone()))
    }

    async fn save_encrypted_settings(&mut self, blob: String) -> Result<()> {
        self.staged = Some(blob);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Some(blob) = self.staged.take() {
            *self.guard = Some(blob);
        }
        Ok(())
    }
}

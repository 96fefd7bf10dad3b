//! Provider registry
//!
//! Immutable mapping from provider type name to a factory. Built once with
//! [`ProviderRegistryBuilder`] and shared by the manager for its lifetime.

use super::backends::{EnvProvider, VaultProvider};
use super::provider::SecretsProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Factory producing a fresh, uninitialized provider instance
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn SecretsProvider> + Send + Sync>;

/// Registry of known provider types
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Registry with the providers shipped in this crate (`env`, `vault`)
    pub fn builtin() -> Self {
        Self::builder()
            .register("env", || Arc::new(EnvProvider::new()) as Arc<dyn SecretsProvider>)
            .register("vault", || Arc::new(VaultProvider::new()) as Arc<dyn SecretsProvider>)
            .build()
    }

    /// Construct a new instance, or `None` for an unknown type name
    pub fn create(&self, name: &str) -> Option<Arc<dyn SecretsProvider>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered type names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Builder for [`ProviderRegistry`]
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistryBuilder {
    /// Register a factory. A later registration under the same name wins.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn SecretsProvider> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(provider = %name, "Registering secrets provider");
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry { factories: self.factories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::provider::ProviderState;

    #[test]
    fn test_builtin_registry() {
        let registry = ProviderRegistry::builtin();

        assert!(registry.contains("env"));
        assert!(registry.contains("vault"));
        assert!(!registry.contains("aws"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["env", "vault"]);
    }

    #[test]
    fn test_create_returns_fresh_instances() {
        let registry = ProviderRegistry::builtin();

        let a = registry.create("env").unwrap();
        let b = registry.create("env").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "env");
        assert_eq!(a.state(), ProviderState::Uninitialized);
    }

    #[test]
    fn test_unknown_name_yields_none() {
        let registry = ProviderRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.create("vault").is_none());
    }

    #[test]
    fn test_debug_lists_names() {
        let registry = ProviderRegistry::builtin();
        let debug = format!("{:?}", registry);
        assert!(debug.contains("env"));
        assert!(debug.contains("vault"));
    }
}

//! Provider factories.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::addrs::Provider;
use crate::error::{EngineError, ProviderError, Result};

use super::echo::{ECHO_PROVIDER_SOURCE, EchoProvider};
use super::interface::ProviderInterface;
use super::schema::ProviderSchema;

/// Creates a fresh provider instance.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn ProviderInterface> + Send + Sync>;

/// Provider factories keyed by provider source address.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<Provider, ProviderFactory>,
    schemas: Arc<RwLock<HashMap<Provider, Arc<ProviderSchema>>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the bundled providers.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        if let Ok(source) = ECHO_PROVIDER_SOURCE.parse::<Provider>() {
            registry.register(source, Arc::new(|| Arc::new(EchoProvider::new()) as Arc<dyn ProviderInterface>));
        }
        registry
    }

    /// Registers a factory.
    pub fn register(&mut self, provider: Provider, factory: ProviderFactory) {
        debug!("Registering provider {provider}");
        self.factories.insert(provider, factory);
    }

    /// Returns true if a factory exists.
    #[must_use]
    pub fn contains(&self, provider: &Provider) -> bool {
        self.factories.contains_key(provider)
    }

    /// Every registered provider.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.factories.keys()
    }

    /// Creates a new, unconfigured instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotAvailable`] if no factory is registered.
    pub fn instantiate(&self, provider: &Provider) -> Result<Arc<dyn ProviderInterface>> {
        let factory = self.factories.get(provider).ok_or_else(|| {
            EngineError::Provider(ProviderError::NotAvailable {
                provider: provider.to_string(),
            })
        })?;
        Ok(factory())
    }

    /// Schema of a provider, fetched once and cached.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotAvailable`] if no factory is registered.
    pub fn schema(&self, provider: &Provider) -> Result<Arc<ProviderSchema>> {
        if let Some(schema) = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
        {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(self.instantiate(provider)?.schema());
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.clone(), Arc::clone(&schema));
        Ok(schema)
    }
}

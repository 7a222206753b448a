//! Provider registry keyed by provider configuration id.
//!
//! ```rust
//! use tprovider::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! assert!(registry.is_empty());
//! assert!(registry.get("openai").is_none());
//! ```

use std::sync::Arc;

use tcommon::Registry;

use crate::ModelProvider;

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Registry<String, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, provider_id: impl Into<String>, provider: P)
    where
        P: ModelProvider + 'static,
    {
        self.providers.insert(provider_id.into(), Arc::new(provider));
    }

    pub fn register_shared(&mut self, provider_id: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(provider_id.into(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn remove(&mut self, provider_id: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.remove(provider_id)
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.providers.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

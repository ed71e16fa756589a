//! Provider registry.
//!
//! Providers are registered on a [`ProviderRegistryBuilder`] during boot; `build()`
//! freezes the set into an immutable [`ProviderRegistry`] that request handlers read
//! concurrently without locking. Iteration follows registration order, which is the
//! order the resolver tries providers in.

use std::collections::HashMap;
use std::sync::Arc;

use passage_core::{AuthError, AuthResult};

use crate::provider::IdentityProvider;

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: Vec<(String, Arc<dyn IdentityProvider>)>,
    index: HashMap<String, usize>,
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `DuplicateProvider` if `name` is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn IdentityProvider>,
    ) -> AuthResult<&mut Self> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(AuthError::DuplicateProvider(name));
        }

        tracing::debug!(provider = %name, position = self.providers.len(), "provider registered");
        self.index.insert(name.clone(), self.providers.len());
        self.providers.push((name, provider));
        Ok(self)
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
            index: self.index,
        }
    }
}

/// Frozen name → provider map.
pub struct ProviderRegistry {
    providers: Vec<(String, Arc<dyn IdentityProvider>)>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn IdentityProvider>> {
        self.index.get(name).map(|&i| &self.providers[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn IdentityProvider>)> {
        self.providers.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl core::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Capabilities;

    struct Inert;

    impl IdentityProvider for Inert {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
    }

    #[test]
    fn preserves_registration_order() {
        let mut builder = ProviderRegistry::builder();
        builder
            .register("session", Arc::new(Inert))
            .unwrap()
            .register("local", Arc::new(Inert))
            .unwrap()
            .register("debug", Arc::new(Inert))
            .unwrap();
        let registry = builder.build();

        assert_eq!(registry.names(), vec!["session", "local", "debug"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("local"));
        assert!(registry.get("google").is_none());
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut builder = ProviderRegistry::builder();
        builder.register("local", Arc::new(Inert)).unwrap();

        let err = builder.register("local", Arc::new(Inert)).err();
        assert_eq!(err, Some(AuthError::DuplicateProvider("local".into())));
        assert_eq!(builder.build().len(), 1);
    }
}

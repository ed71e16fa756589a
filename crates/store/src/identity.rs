//! Identity persistence contract.
//!
//! The resolver only needs `find`; `create`/`update`/`delete` exist for the
//! identity-creation and administration flows built on top of this layer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use passage_core::{Clock, Identity, IdentityId, JsonMap, ProviderIdentity, SystemClock};

use crate::error::StoreError;

/// How an identity is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Id(String),
    Provider {
        provider: String,
        provider_id: String,
    },
}

impl IdentityKey {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn provider(provider: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            provider_id: provider_id.into(),
        }
    }

    fn matches(&self, identity: &Identity) -> bool {
        match self {
            IdentityKey::Id(id) => identity.id == *id,
            IdentityKey::Provider {
                provider,
                provider_id,
            } => identity.provider() == provider && identity.provider_id() == provider_id,
        }
    }
}

impl From<&ProviderIdentity> for IdentityKey {
    fn from(value: &ProviderIdentity) -> Self {
        Self::provider(value.provider.clone(), value.provider_id.clone())
    }
}

/// Data for a new identity; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIdentity {
    pub user_id: String,
    pub user_type: String,
    pub provider: String,
    pub provider_id: String,
    pub provider_data: Option<JsonMap>,
    pub disabled: bool,
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityPatch {
    pub disabled: Option<bool>,
    pub user_type: Option<String>,
    /// `Some(None)` clears provider data.
    pub provider_data: Option<Option<JsonMap>>,
}

impl IdentityPatch {
    pub fn disable() -> Self {
        Self {
            disabled: Some(true),
            ..Default::default()
        }
    }

    pub fn enable() -> Self {
        Self {
            disabled: Some(false),
            ..Default::default()
        }
    }

    fn apply(&self, identity: &mut Identity) {
        if let Some(disabled) = self.disabled {
            identity.disabled = disabled;
        }
        if let Some(user_type) = &self.user_type {
            identity.user_type = user_type.clone();
        }
        if let Some(data) = &self.provider_data {
            identity.source.provider_data = data.clone();
        }
    }
}

/// Delete filter. Each set field restricts the match to the listed values; an
/// identity is deleted when it satisfies every set field. A filter with no field
/// set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFilter {
    pub ids: Option<Vec<String>>,
    pub user_ids: Option<Vec<String>>,
    pub providers: Option<Vec<String>>,
    pub provider_ids: Option<Vec<String>>,
}

impl IdentityFilter {
    pub fn by_user(user_id: impl Into<String>) -> Self {
        Self {
            user_ids: Some(vec![user_id.into()]),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_none()
            && self.user_ids.is_none()
            && self.providers.is_none()
            && self.provider_ids.is_none()
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        fn field(values: &Option<Vec<String>>, actual: &str) -> bool {
            values
                .as_ref()
                .is_none_or(|vs| vs.iter().any(|v| v == actual))
        }

        !self.is_empty()
            && field(&self.ids, &identity.id)
            && field(&self.user_ids, &identity.user_id)
            && field(&self.providers, identity.provider())
            && field(&self.provider_ids, identity.provider_id())
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find(&self, key: &IdentityKey) -> Result<Option<Identity>, StoreError>;

    /// Fails with `Conflict` if `(provider, provider_id)` already exists.
    async fn create(&self, data: NewIdentity) -> Result<Identity, StoreError>;

    /// Fails with `NotFound` if nothing matches `key`.
    async fn update(&self, key: &IdentityKey, patch: IdentityPatch)
    -> Result<Identity, StoreError>;

    /// Returns the number of deleted identities.
    async fn delete(&self, filter: &IdentityFilter) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> IdentityStore for Arc<S>
where
    S: IdentityStore + ?Sized,
{
    async fn find(&self, key: &IdentityKey) -> Result<Option<Identity>, StoreError> {
        (**self).find(key).await
    }

    async fn create(&self, data: NewIdentity) -> Result<Identity, StoreError> {
        (**self).create(data).await
    }

    async fn update(
        &self,
        key: &IdentityKey,
        patch: IdentityPatch,
    ) -> Result<Identity, StoreError> {
        (**self).update(key, patch).await
    }

    async fn delete(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        (**self).delete(filter).await
    }
}

/// In-memory identity store for tests/dev.
pub struct InMemoryIdentityStore {
    inner: RwLock<HashMap<String, Identity>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn lock_error() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find(&self, key: &IdentityKey) -> Result<Option<Identity>, StoreError> {
        let map = self.inner.read().map_err(|_| Self::lock_error())?;
        Ok(match key {
            IdentityKey::Id(id) => map.get(id).cloned(),
            _ => map.values().find(|i| key.matches(i)).cloned(),
        })
    }

    async fn create(&self, data: NewIdentity) -> Result<Identity, StoreError> {
        let mut map = self.inner.write().map_err(|_| Self::lock_error())?;

        let key = IdentityKey::provider(data.provider.clone(), data.provider_id.clone());
        if map.values().any(|i| key.matches(i)) {
            return Err(StoreError::Conflict(format!(
                "identity {}:{} already exists",
                data.provider, data.provider_id
            )));
        }

        let identity = Identity {
            id: IdentityId::new().to_string(),
            user_id: data.user_id,
            user_type: data.user_type,
            disabled: data.disabled,
            created_at: self.clock.now(),
            source: ProviderIdentity {
                provider: data.provider,
                provider_id: data.provider_id,
                provider_data: data.provider_data,
            },
        };
        map.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn update(
        &self,
        key: &IdentityKey,
        patch: IdentityPatch,
    ) -> Result<Identity, StoreError> {
        let mut map = self.inner.write().map_err(|_| Self::lock_error())?;
        let identity = map
            .values_mut()
            .find(|i| key.matches(i))
            .ok_or(StoreError::NotFound)?;
        patch.apply(identity);
        Ok(identity.clone())
    }

    async fn delete(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        let mut map = self.inner.write().map_err(|_| Self::lock_error())?;
        let before = map.len();
        map.retain(|_, i| !filter.matches(i));
        Ok((before - map.len()) as u64)
    }
}

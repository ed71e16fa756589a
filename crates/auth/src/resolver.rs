//! Two-stage identity resolution.
//!
//! Stage one ([`IdentityResolver::apply_provider_identity`]) asks registered
//! providers, in registration order, to recognise the request; the first provider
//! that does wins and no other provider is consulted. Stage two
//! ([`IdentityResolver::apply_identity`]) escalates that provider identity to a
//! durable [`Identity`], through the provider's own shortcut when it has one and
//! through the identity store otherwise.
//!
//! "Nobody recognised this request" is `Ok(None)`. A provider identity naming an
//! unregistered provider is `Err(UnknownProvider)`: resolution and escalation
//! disagree about the provider set, which is a deployment bug.

use std::sync::Arc;

use passage_core::{AuthError, AuthResult, Identity, ProviderIdentity, UserData};
use passage_store::{IdentityKey, IdentityStore};

use crate::context::AuthContext;
use crate::provider::{Capability, IdentityProvider, RequestHeaders};
use crate::registry::ProviderRegistry;

/// Restricts which providers stage one may consult.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProviderFilter {
    #[default]
    Any,
    Named(Vec<String>),
}

impl ProviderFilter {
    pub fn only(name: impl Into<String>) -> Self {
        Self::Named(vec![name.into()])
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            ProviderFilter::Any => true,
            ProviderFilter::Named(names) => names.iter().any(|n| n == name),
        }
    }
}

impl From<&str> for ProviderFilter {
    fn from(value: &str) -> Self {
        Self::only(value)
    }
}

/// Result of probing one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderHealth {
    pub provider: String,
    pub error: Option<AuthError>,
}

impl ProviderHealth {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

pub struct IdentityResolver {
    registry: Arc<ProviderRegistry>,
    identities: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(registry: Arc<ProviderRegistry>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            registry,
            identities,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn provider(&self, name: &str) -> AuthResult<&Arc<dyn IdentityProvider>> {
        self.registry.get(name).ok_or_else(|| {
            tracing::error!(provider = %name, "provider identity references an unregistered provider");
            AuthError::UnknownProvider(name.to_string())
        })
    }

    /// Stage one: find the first provider that recognises `headers`.
    ///
    /// Providers are awaited one at a time; a later provider is never called once
    /// an earlier one has matched.
    pub async fn apply_provider_identity(
        &self,
        ctx: &mut AuthContext,
        headers: &RequestHeaders,
        filter: &ProviderFilter,
    ) -> AuthResult<Option<ProviderIdentity>> {
        for (name, provider) in self.registry.iter() {
            if !provider.capabilities().has(Capability::ProviderIdentity) || !filter.allows(name) {
                continue;
            }

            if let Some(provider_identity) = provider.resolve_provider_identity(headers).await? {
                tracing::debug!(
                    provider = %name,
                    ident = %provider_identity.ident(),
                    "provider identity resolved"
                );
                ctx.set_provider_identity(provider_identity.clone());
                return Ok(Some(provider_identity));
            }
        }

        tracing::trace!("no provider recognised the request");
        Ok(None)
    }

    /// Stage two: escalate a provider identity to a full identity.
    pub async fn apply_identity(
        &self,
        ctx: &mut AuthContext,
        provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<Identity>> {
        let provider = self.provider(&provider_identity.provider)?;

        let mut identity = None;
        if provider.capabilities().has(Capability::Identity) {
            identity = provider.resolve_identity(provider_identity).await?;
        }

        if identity.is_none() {
            identity = self
                .identities
                .find(&IdentityKey::from(provider_identity))
                .await?;
        }

        match identity {
            Some(identity) => {
                tracing::debug!(
                    provider = %provider_identity.provider,
                    ident = %identity.ident(),
                    disabled = identity.disabled,
                    "identity resolved"
                );
                ctx.set_identity(identity.clone());
                Ok(Some(identity))
            }
            None => {
                tracing::debug!(ident = %provider_identity.ident(), "no identity for provider identity");
                Ok(None)
            }
        }
    }

    /// Both stages, in order.
    pub async fn authenticate(
        &self,
        ctx: &mut AuthContext,
        headers: &RequestHeaders,
        filter: &ProviderFilter,
    ) -> AuthResult<Option<Identity>> {
        match self.apply_provider_identity(ctx, headers, filter).await? {
            Some(provider_identity) => self.apply_identity(ctx, &provider_identity).await,
            None => Ok(None),
        }
    }

    /// Profile enrichment from the provider that produced `provider_identity`.
    pub async fn user_data(
        &self,
        provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<UserData>> {
        let provider = self.provider(&provider_identity.provider)?;
        if !provider.capabilities().has(Capability::UserData) {
            return Ok(None);
        }
        provider.user_data(provider_identity).await
    }

    /// Probe every provider that declares a health check, in registration order.
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::new();
        for (name, provider) in self.registry.iter() {
            if !provider.capabilities().has(Capability::Health) {
                continue;
            }

            let error = provider.health().await.err();
            if let Some(e) = &error {
                tracing::warn!(provider = %name, error = %e, "provider unhealthy");
            }
            report.push(ProviderHealth {
                provider: name.to_string(),
                error,
            });
        }
        report
    }
}

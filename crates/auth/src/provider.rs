//! Identity provider capability interface.
//!
//! Providers implement only the capabilities they support and declare them via
//! [`IdentityProvider::capabilities`]. Callers check that declaration before
//! invoking a method; the default bodies exist only so implementors don't have to
//! write stubs for capabilities they never declare.

use std::collections::HashMap;

use async_trait::async_trait;

use passage_core::{AuthResult, Identity, ProviderIdentity, UserData};

/// One optional provider capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Parse inbound transport data into a [`ProviderIdentity`].
    ProviderIdentity,
    /// Escalate a [`ProviderIdentity`] to an [`Identity`] without the identity store.
    Identity,
    /// Fetch profile enrichment.
    UserData,
    /// Liveness probe.
    Health,
}

/// Set of capabilities a provider implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    provider_identity: bool,
    identity: bool,
    user_data: bool,
    health: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        provider_identity: false,
        identity: false,
        user_data: false,
        health: false,
    };

    pub const fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::ProviderIdentity => self.provider_identity = true,
            Capability::Identity => self.identity = true,
            Capability::UserData => self.user_data = true,
            Capability::Health => self.health = true,
        }
        self
    }

    pub const fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::ProviderIdentity => self.provider_identity,
            Capability::Identity => self.identity,
            Capability::UserData => self.user_data,
            Capability::Health => self.health,
        }
    }
}

/// Case-insensitive view of inbound request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    inner: HashMap<String, String>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Shorthand for a request carrying `Authorization: Bearer <token>`.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::new().with("authorization", format!("Bearer {}", token.as_ref()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.get("authorization")
    }

    /// Token of an `Authorization: Bearer <token>` header, if well-formed.
    pub fn bearer_token(&self) -> Option<&str> {
        let header = self.authorization()?;
        let token = header.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }
        Some(token)
    }
}

impl<K, V> FromIterator<(K, V)> for RequestHeaders
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// A pluggable identity source.
///
/// `resolve_provider_identity` must not fail for absent or malformed credentials;
/// it returns `Ok(None)` so that "unauthenticated" stays a cheap, normal outcome.
/// Errors are reserved for misconfiguration and backend failures.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn resolve_provider_identity(
        &self,
        _headers: &RequestHeaders,
    ) -> AuthResult<Option<ProviderIdentity>> {
        Ok(None)
    }

    async fn resolve_identity(
        &self,
        _provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<Identity>> {
        Ok(None)
    }

    async fn user_data(
        &self,
        _provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<UserData>> {
        Ok(None)
    }

    async fn health(&self) -> AuthResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_sets() {
        let caps = Capabilities::NONE
            .with(Capability::ProviderIdentity)
            .with(Capability::Health);
        assert!(caps.has(Capability::ProviderIdentity));
        assert!(caps.has(Capability::Health));
        assert!(!caps.has(Capability::Identity));
        assert!(!caps.has(Capability::UserData));
        assert_eq!(Capabilities::default(), Capabilities::NONE);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers: RequestHeaders = [("Authorization", "Bearer abc"), ("X-Trace", "1")]
            .into_iter()
            .collect();
        assert_eq!(headers.get("AUTHORIZATION"), Some("Bearer abc"));
        assert_eq!(headers.get("x-trace"), Some("1"));
        assert_eq!(headers.bearer_token(), Some("abc"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes_and_blanks() {
        assert_eq!(RequestHeaders::new().bearer_token(), None);
        assert_eq!(
            RequestHeaders::new()
                .with("authorization", "Basic Zm9vOmJhcg==")
                .bearer_token(),
            None
        );
        assert_eq!(
            RequestHeaders::new()
                .with("authorization", "Bearer    ")
                .bearer_token(),
            None
        );
        assert_eq!(
            RequestHeaders::bearer("session:xyz").bearer_token(),
            Some("session:xyz")
        );
    }
}

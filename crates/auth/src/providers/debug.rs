//! `debug` provider: development bypass.
//!
//! Trusts `Authorization: Bearer debug:<userId>[:<type>]` verbatim. Only register
//! it when `AuthConfig::debug_provider` is set.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use passage_core::{AuthResult, Clock, Identity, JsonMap, ProviderIdentity, UserData};

use crate::provider::{Capabilities, Capability, IdentityProvider, RequestHeaders};

pub const DEBUG_PROVIDER: &str = "debug";
pub const DEBUG_TOKEN_PREFIX: &str = "debug:";
pub const DEFAULT_USER_TYPE: &str = "user";

pub struct DebugProvider {
    clock: Arc<dyn Clock>,
}

impl DebugProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        tracing::warn!("debug identity provider enabled; requests can impersonate any user");
        Self { clock }
    }
}

/// Split `<userId>[:<type>]`.
fn parse(credential: &str) -> Option<(&str, &str)> {
    let (user_id, user_type) = match credential.split_once(':') {
        Some((user_id, user_type)) => (user_id, user_type),
        None => (credential, DEFAULT_USER_TYPE),
    };
    if user_id.is_empty() || user_type.is_empty() || user_type.contains(':') {
        return None;
    }
    Some((user_id, user_type))
}

#[async_trait]
impl IdentityProvider for DebugProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
            .with(Capability::ProviderIdentity)
            .with(Capability::Identity)
            .with(Capability::UserData)
    }

    async fn resolve_provider_identity(
        &self,
        headers: &RequestHeaders,
    ) -> AuthResult<Option<ProviderIdentity>> {
        let Some(credential) = headers
            .bearer_token()
            .and_then(|t| t.strip_prefix(DEBUG_TOKEN_PREFIX))
        else {
            return Ok(None);
        };
        let Some((user_id, user_type)) = parse(credential) else {
            return Ok(None);
        };

        let mut data = JsonMap::new();
        data.insert("type".into(), JsonValue::String(user_type.to_string()));
        Ok(Some(
            ProviderIdentity::new(DEBUG_PROVIDER, user_id).with_data(data),
        ))
    }

    async fn resolve_identity(
        &self,
        provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<Identity>> {
        if provider_identity.provider != DEBUG_PROVIDER {
            return Ok(None);
        }
        let user_type = provider_identity
            .data("type")
            .and_then(JsonValue::as_str)
            .unwrap_or(DEFAULT_USER_TYPE);

        Ok(Some(Identity {
            id: provider_identity.ident(),
            user_id: provider_identity.provider_id.clone(),
            user_type: user_type.to_string(),
            disabled: false,
            created_at: self.clock.now(),
            source: provider_identity.clone(),
        }))
    }

    async fn user_data(
        &self,
        provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<UserData>> {
        Ok(Some(UserData {
            name: Some(provider_identity.provider_id.clone()),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use passage_core::ManualClock;

    use super::*;

    fn provider() -> DebugProvider {
        DebugProvider::new(Arc::new(ManualClock::at_unix(1_700_000_000)))
    }

    #[test]
    fn credential_parsing() {
        assert_eq!(parse("u-1"), Some(("u-1", "user")));
        assert_eq!(parse("u-1:admin"), Some(("u-1", "admin")));
        assert_eq!(parse(""), None);
        assert_eq!(parse(":admin"), None);
        assert_eq!(parse("u-1:"), None);
        assert_eq!(parse("u-1:a:b"), None);
    }

    #[tokio::test]
    async fn impersonates_the_named_user() {
        let debug = provider();
        let pi = debug
            .resolve_provider_identity(&RequestHeaders::bearer("debug:u-7:staff"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pi.ident(), "debug:u-7");

        let identity = debug.resolve_identity(&pi).await.unwrap().unwrap();
        assert_eq!(identity.user_id, "u-7");
        assert_eq!(identity.user_type, "staff");
        assert_eq!(identity.ident(), "staff:u-7");
        assert!(!identity.disabled);
        assert_eq!(identity.created_at.timestamp(), 1_700_000_000);

        let profile = debug.user_data(&pi).await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("u-7"));
    }

    #[tokio::test]
    async fn ignores_other_bearers() {
        let debug = provider();
        for headers in [
            RequestHeaders::new(),
            RequestHeaders::bearer("session:abc"),
            RequestHeaders::bearer("debug:"),
        ] {
            assert_eq!(debug.resolve_provider_identity(&headers).await.unwrap(), None);
        }
        let foreign = ProviderIdentity::new("local", "u-1");
        assert_eq!(debug.resolve_identity(&foreign).await.unwrap(), None);
    }
}

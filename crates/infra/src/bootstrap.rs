//! Boot-time wiring of the authentication stack.
//!
//! Providers are registered in a fixed order: `session`, `local`, then `debug`
//! when enabled. The registry is frozen before the resolver is handed out.

use std::sync::Arc;

use passage_auth::{
    AuthConfig, DEBUG_PROVIDER, DebugProvider, IdentityResolver, LOCAL_PROVIDER, LocalProvider,
    ProviderRegistry, SESSION_PROVIDER, SessionManager, TokenSigner,
};
use passage_core::{AuthResult, Clock, SystemClock};
use passage_store::{IdentityStore, InMemoryIdentityStore, InMemoryTtlStore, TtlStore};

use crate::config::AppConfig;
use crate::identity_store::PostgresIdentityStore;

/// Fully wired authentication layer.
#[derive(Clone)]
pub struct AuthStack {
    pub clock: Arc<dyn Clock>,
    pub signer: TokenSigner,
    pub sessions: Arc<SessionManager>,
    pub local: Arc<LocalProvider>,
    pub identities: Arc<dyn IdentityStore>,
    pub resolver: Arc<IdentityResolver>,
}

impl AuthStack {
    pub fn build(
        config: &AuthConfig,
        ttl: Arc<dyn TtlStore>,
        identities: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        config.validate()?;
        if config.secret_bytes().is_none() {
            tracing::warn!("AUTH_TOKEN_SECRET is not set; token operations will fail");
        }

        let signer = TokenSigner::new(config.secret_bytes(), clock.clone());
        let sessions = Arc::new(SessionManager::new(signer.clone(), ttl, config.session)?);
        let local = Arc::new(LocalProvider::new(signer.clone(), config.local));

        let mut builder = ProviderRegistry::builder();
        builder
            .register(SESSION_PROVIDER, sessions.clone())?
            .register(LOCAL_PROVIDER, local.clone())?;
        if config.debug_provider {
            builder.register(DEBUG_PROVIDER, Arc::new(DebugProvider::new(clock.clone())))?;
        }
        let registry = Arc::new(builder.build());
        tracing::info!(providers = ?registry.names(), "identity providers registered");

        let resolver = Arc::new(IdentityResolver::new(registry, identities.clone()));
        Ok(Self {
            clock,
            signer,
            sessions,
            local,
            identities,
            resolver,
        })
    }

    /// Connect the configured backends and build the stack.
    ///
    /// Falls back to in-memory stores for anything not configured.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let ttl: Arc<dyn TtlStore> = match &config.redis {
            Some(redis) => connect_redis(&redis.url, &redis.namespace).await?,
            None => {
                tracing::warn!("REDIS_URL not set; sessions are kept in memory");
                Arc::new(InMemoryTtlStore::with_clock(clock.clone()))
            }
        };

        let identities: Arc<dyn IdentityStore> = match &config.database_url {
            Some(url) => {
                let store = PostgresIdentityStore::connect(url).await?;
                store.ensure_schema().await?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; identities are kept in memory");
                Arc::new(InMemoryIdentityStore::with_clock(clock.clone()))
            }
        };

        Ok(Self::build(&config.auth, ttl, identities, clock)?)
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str, namespace: &str) -> anyhow::Result<Arc<dyn TtlStore>> {
    let store = crate::ttl_store::RedisTtlStore::connect(url, namespace).await?;
    tracing::info!(namespace = %namespace, "redis session store connected");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str, _namespace: &str) -> anyhow::Result<Arc<dyn TtlStore>> {
    anyhow::bail!("REDIS_URL is set but this build does not include the `redis` feature")
}

#[cfg(test)]
mod tests {
    use passage_auth::{AuthContext, IdentityProvider, ProviderFilter, RequestHeaders};
    use passage_core::ManualClock;

    use super::*;

    fn stack(debug_provider: bool) -> AuthStack {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_unix(1_700_000_000));
        let config = AuthConfig {
            token_secret: Some("boot-secret".into()),
            debug_provider,
            ..AuthConfig::default()
        };
        AuthStack::build(
            &config,
            Arc::new(InMemoryTtlStore::with_clock(clock.clone())),
            Arc::new(InMemoryIdentityStore::with_clock(clock.clone())),
            clock,
        )
        .unwrap()
    }

    #[test]
    fn registers_providers_in_boot_order() {
        assert_eq!(stack(false).resolver.registry().names(), vec!["session", "local"]);
        assert_eq!(
            stack(true).resolver.registry().names(),
            vec!["session", "local", "debug"]
        );
    }

    #[tokio::test]
    async fn debug_bypass_only_when_enabled() {
        let headers = RequestHeaders::bearer("debug:u-1");

        let off = stack(false);
        let got = off
            .resolver
            .authenticate(&mut AuthContext::new(), &headers, &ProviderFilter::Any)
            .await
            .unwrap();
        assert_eq!(got, None);

        let on = stack(true);
        let got = on
            .resolver
            .authenticate(&mut AuthContext::new(), &headers, &ProviderFilter::Any)
            .await
            .unwrap();
        assert_eq!(got.map(|i| i.user_id), Some("u-1".to_string()));
    }

    #[tokio::test]
    async fn in_memory_fallback_when_nothing_is_configured() {
        let config = AppConfig {
            auth: AuthConfig {
                token_secret: Some("s".into()),
                ..AuthConfig::default()
            },
            ..AppConfig::default()
        };
        let stack = AuthStack::connect(&config).await.unwrap();
        assert_eq!(stack.sessions.health().await, Ok(()));
    }

    #[test]
    fn invalid_session_config_fails_boot() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut config = AuthConfig::default();
        config.session.access_ttl_secs = config.session.refresh_ttl_secs;
        let err = AuthStack::build(
            &config,
            Arc::new(InMemoryTtlStore::new()),
            Arc::new(InMemoryIdentityStore::new()),
            clock,
        )
        .err();
        assert!(matches!(err, Some(passage_core::AuthError::Configuration(_))));
    }
}

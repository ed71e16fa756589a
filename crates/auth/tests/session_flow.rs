use std::sync::Arc;

use passage_auth::{
    ACCESS_AUDIENCE, AuthContext, DEBUG_PROVIDER, DebugProvider, IdentityResolver, LOCAL_PROVIDER,
    LocalProvider, LocalTokenConfig, PayloadUpdate, ProviderFilter, ProviderRegistry,
    REFRESH_AUDIENCE, RequestHeaders, SESSION_PROVIDER, SessionConfig, SessionManager,
    SessionSubject, TokenSigner,
};
use passage_core::{AuthError, Clock, ManualClock};
use passage_store::{IdentityStore, InMemoryIdentityStore, InMemoryTtlStore, NewIdentity};

const T0: i64 = 1_700_000_000;

struct Stack {
    clock: Arc<ManualClock>,
    identities: Arc<InMemoryIdentityStore>,
    sessions: Arc<SessionManager>,
    local: Arc<LocalProvider>,
    resolver: IdentityResolver,
}

fn stack(extend_expiry: bool) -> Stack {
    let clock = Arc::new(ManualClock::at_unix(T0));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let signer = TokenSigner::new(Some(b"integration-secret"), dyn_clock.clone());

    let ttl = Arc::new(InMemoryTtlStore::with_clock(dyn_clock.clone()));
    let identities = Arc::new(InMemoryIdentityStore::with_clock(dyn_clock.clone()));

    let sessions = Arc::new(
        SessionManager::new(
            signer.clone(),
            ttl,
            SessionConfig {
                refresh_ttl_secs: 3600,
                access_ttl_secs: 300,
                extend_expiry,
            },
        )
        .unwrap(),
    );
    let local = Arc::new(LocalProvider::new(signer, LocalTokenConfig::default()));

    let mut builder = ProviderRegistry::builder();
    builder
        .register(SESSION_PROVIDER, sessions.clone())
        .unwrap()
        .register(LOCAL_PROVIDER, local.clone())
        .unwrap()
        .register(DEBUG_PROVIDER, Arc::new(DebugProvider::new(dyn_clock)))
        .unwrap();
    let resolver = IdentityResolver::new(Arc::new(builder.build()), identities.clone());

    Stack {
        clock,
        identities,
        sessions,
        local,
        resolver,
    }
}

fn subject() -> SessionSubject {
    SessionSubject {
        user_id: "u-1".into(),
        authn_id: "identity-1".into(),
        user_type: "customer".into(),
    }
}

#[tokio::test]
async fn should_extend_flips_near_the_end_of_the_refresh_window() {
    let s = stack(true);
    let grant = s.sessions.create(subject(), None, None).await.unwrap();

    let fresh = s
        .sessions
        .resolve_session((&grant.refresh_token).into(), REFRESH_AUDIENCE)
        .await
        .unwrap();
    assert_eq!(fresh.session.session_id, grant.session.session_id);
    assert!(!fresh.should_extend);

    s.clock.advance_secs(3600 - 100);
    let late = s
        .sessions
        .resolve_session((&grant.refresh_token).into(), REFRESH_AUDIENCE)
        .await
        .unwrap();
    assert!(late.should_extend);
}

#[tokio::test]
async fn deleting_a_session_revokes_its_tokens() {
    let s = stack(true);
    let grant = s.sessions.create(subject(), None, None).await.unwrap();
    let access = s
        .sessions
        .create_access_token(&grant.session.to_ref(), None)
        .unwrap();

    assert!(
        s.sessions
            .delete_session(&grant.session.session_id, "u-1")
            .await
            .unwrap()
    );

    let err = s
        .sessions
        .resolve_session((&grant.refresh_token).into(), REFRESH_AUDIENCE)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::InvalidSession);

    // The access token still verifies, but the request stays anonymous.
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(&mut ctx, &RequestHeaders::bearer(&access.access_token), &ProviderFilter::Any)
        .await
        .unwrap();
    assert_eq!(identity, None);
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.provider_identity().map(|p| p.provider.as_str()), Some(SESSION_PROVIDER));
}

#[tokio::test]
async fn renewal_with_and_without_extension() {
    for extend in [true, false] {
        let s = stack(extend);
        let grant = s.sessions.create(subject(), None, None).await.unwrap();

        s.clock.advance_secs(600);
        let renewed = s
            .sessions
            .update(&grant.session.to_ref(), PayloadUpdate::Keep, None)
            .await
            .unwrap();

        assert_eq!(renewed.session.session_id, grant.session.session_id);
        assert_eq!(renewed.session.created_at, grant.session.created_at);
        let expected = if extend {
            T0 + 600 + 3600
        } else {
            grant.session.expires_at
        };
        assert_eq!(renewed.session.expires_at, expected, "extend = {extend}");

        // The renewed refresh token resolves to the same session.
        let resolved = s
            .sessions
            .resolve_session((&renewed.refresh_token).into(), REFRESH_AUDIENCE)
            .await
            .unwrap();
        assert_eq!(resolved.session, renewed.session);
    }
}

#[tokio::test]
async fn full_chain_resolves_each_provider_in_turn() {
    let s = stack(true);

    // session
    let grant = s.sessions.create(subject(), None, None).await.unwrap();
    let access = s
        .sessions
        .create_access_token(&grant.session.to_ref(), None)
        .unwrap();
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(&mut ctx, &RequestHeaders::bearer(&access.access_token), &ProviderFilter::Any)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.id, "identity-1");
    assert_eq!(ctx.ident(), Some("customer:u-1"));

    // local, escalated through the identity store
    let stored = s
        .identities
        .create(NewIdentity {
            user_id: "u-alice".into(),
            user_type: "staff".into(),
            provider: LOCAL_PROVIDER.into(),
            provider_id: "alice@example.com".into(),
            provider_data: None,
            disabled: false,
        })
        .await
        .unwrap();
    let tokens = s.local.issue("alice@example.com").unwrap();
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(&mut ctx, &RequestHeaders::bearer(&tokens.access_token), &ProviderFilter::Any)
        .await
        .unwrap();
    assert_eq!(identity, Some(stored));

    // local token for an unknown user: recognised, not escalated
    let stranger = s.local.issue("nobody@example.com").unwrap();
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(&mut ctx, &RequestHeaders::bearer(&stranger.access_token), &ProviderFilter::Any)
        .await
        .unwrap();
    assert_eq!(identity, None);
    assert_eq!(ctx.ident(), Some("local:nobody@example.com"));

    // debug
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(&mut ctx, &RequestHeaders::bearer("debug:u-9:admin"), &ProviderFilter::Any)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.ident(), "admin:u-9");
    let profile = s
        .resolver
        .user_data(ctx.provider_identity().unwrap())
        .await
        .unwrap();
    assert_eq!(profile.and_then(|p| p.name), Some("u-9".to_string()));

    // a filter that excludes debug leaves the request anonymous
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(
            &mut ctx,
            &RequestHeaders::bearer("debug:u-9"),
            &ProviderFilter::any_of([SESSION_PROVIDER, LOCAL_PROVIDER]),
        )
        .await
        .unwrap();
    assert_eq!(identity, None);
    assert_eq!(ctx.provider_identity(), None);
}

#[tokio::test]
async fn expired_access_token_is_anonymous_but_session_survives() {
    let s = stack(true);
    let grant = s.sessions.create(subject(), None, None).await.unwrap();
    let access = s
        .sessions
        .create_access_token(&grant.session.to_ref(), None)
        .unwrap();

    s.clock.advance_secs(300);
    let mut ctx = AuthContext::new();
    let identity = s
        .resolver
        .authenticate(&mut ctx, &RequestHeaders::bearer(&access.access_token), &ProviderFilter::Any)
        .await
        .unwrap();
    assert_eq!(identity, None);

    let fresh = s
        .sessions
        .create_access_token(&grant.session.to_ref(), None)
        .unwrap();
    let resolved = s
        .sessions
        .resolve_session((&fresh.access_token).into(), ACCESS_AUDIENCE)
        .await
        .unwrap();
    assert_eq!(resolved.session.session_id, grant.session.session_id);
}

#[tokio::test]
async fn health_covers_providers_that_declare_it() {
    let s = stack(true);
    let report = s.resolver.health().await;
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].provider, SESSION_PROVIDER);
    assert!(report[0].is_healthy());
}

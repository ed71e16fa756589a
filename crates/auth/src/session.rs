//! Server-side sessions.
//!
//! A session is a TTL-bound record in a [`TtlStore`], keyed by `(session_id,
//! user_id)`. Refresh tokens (`session:refresh`) and access tokens
//! (`session:access`) are minted for it; both carry `uid`/`sid` and the `session:`
//! wire prefix. A token is only honoured while its session still exists, so
//! deleting the session revokes every token minted for it.
//!
//! Renewal updates the record in place: `session_id`, `created_at`, `authn_id` and
//! `user_type` never change, only `expires_at` (when the extension policy is on)
//! and the payload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use passage_core::{
    AuthError, AuthResult, Identity, JsonMap, ProviderIdentity, SessionId,
};
use passage_store::{StoreError, TtlStore};

use crate::config::SessionConfig;
use crate::provider::{Capabilities, Capability, IdentityProvider, RequestHeaders};
use crate::token::{IssueOptions, TokenRecord, TokenSigner, VerifyOptions, validate_window};

pub const SESSION_PROVIDER: &str = "session";
pub const SESSION_TOKEN_PREFIX: &str = "session:";
pub const REFRESH_AUDIENCE: &str = "session:refresh";
pub const ACCESS_AUDIENCE: &str = "session:access";

/// `should_extend` fires once a token has less than 1/5 of the refresh TTL left.
const EXTEND_THRESHOLD_DIVISOR: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    /// Identity (authentication event source) the session was opened for.
    pub authn_id: String,
    pub user_type: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
    #[serde(default)]
    pub payload: JsonMap,
}

impl Session {
    pub fn to_ref(&self) -> SessionRef {
        SessionRef::new(self.session_id.clone(), self.user_id.clone())
    }
}

/// Who a new session is opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubject {
    pub user_id: String,
    pub authn_id: String,
    pub user_type: String,
}

impl From<&Identity> for SessionSubject {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            authn_id: identity.id.clone(),
            user_type: identity.user_type.clone(),
        }
    }
}

/// Store address of a session. The user id is the partition key; the store cannot
/// find a session by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionRef {
    pub session_id: String,
    pub user_id: String,
}

impl SessionRef {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// How renewal treats the stored payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PayloadUpdate {
    #[default]
    Keep,
    /// Shallow merge; new keys win.
    Merge(JsonMap),
    Replace(JsonMap),
}

impl PayloadUpdate {
    fn apply(self, payload: &mut JsonMap) {
        match self {
            PayloadUpdate::Keep => {}
            PayloadUpdate::Merge(update) => payload.extend(update),
            PayloadUpdate::Replace(update) => *payload = update,
        }
    }
}

/// A session together with a freshly minted refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionGrant {
    pub session: Session,
    pub refresh_token: String,
    pub refresh_token_record: TokenRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    pub access_token: String,
    pub access_token_record: TokenRecord,
}

/// A token as presented to [`SessionManager::resolve_session`].
#[derive(Debug, Clone, Copy)]
pub enum SessionToken<'a> {
    /// Wire form, verified here.
    Raw(&'a str),
    /// Already verified earlier in the same request.
    Record(&'a TokenRecord),
}

impl<'a> From<&'a str> for SessionToken<'a> {
    fn from(value: &'a str) -> Self {
        Self::Raw(value)
    }
}

impl<'a> From<&'a String> for SessionToken<'a> {
    fn from(value: &'a String) -> Self {
        Self::Raw(value.as_str())
    }
}

impl<'a> From<&'a TokenRecord> for SessionToken<'a> {
    fn from(value: &'a TokenRecord) -> Self {
        Self::Record(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSession {
    pub session: Session,
    pub token: TokenRecord,
    /// Advisory: the caller may want to renew. Never acted on here.
    pub should_extend: bool,
}

pub struct SessionManager {
    signer: TokenSigner,
    store: Arc<dyn TtlStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        signer: TokenSigner,
        store: Arc<dyn TtlStore>,
        config: SessionConfig,
    ) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self {
            signer,
            store,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a new session and mint its first refresh token.
    pub async fn create(
        &self,
        subject: SessionSubject,
        session_payload: Option<JsonMap>,
        token_payload: Option<JsonMap>,
    ) -> AuthResult<SessionGrant> {
        if subject.user_id.trim().is_empty() {
            return Err(AuthError::validation("session requires a user id"));
        }
        if subject.authn_id.trim().is_empty() {
            return Err(AuthError::validation("session requires an authn id"));
        }

        let now = self.signer.now();
        let session = Session {
            session_id: SessionId::new().to_string(),
            user_id: subject.user_id,
            authn_id: subject.authn_id,
            user_type: subject.user_type,
            created_at: now,
            expires_at: now + self.config.refresh_ttl_secs,
            payload: session_payload.unwrap_or_default(),
        };

        let (refresh_token, refresh_token_record) =
            self.mint(&session.to_ref(), token_payload, REFRESH_AUDIENCE, session.expires_at)?;
        self.persist(&session, self.config.refresh_ttl_secs).await?;

        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            expires_at = session.expires_at,
            "session created"
        );

        Ok(SessionGrant {
            session,
            refresh_token,
            refresh_token_record,
        })
    }

    /// Mint a short-lived access token. Does not touch the store.
    pub fn create_access_token(
        &self,
        session: &SessionRef,
        payload: Option<JsonMap>,
    ) -> AuthResult<AccessGrant> {
        let expires_at = self.signer.now() + self.config.access_ttl_secs;
        let (access_token, access_token_record) =
            self.mint(session, payload, ACCESS_AUDIENCE, expires_at)?;
        Ok(AccessGrant {
            access_token,
            access_token_record,
        })
    }

    /// Renew a session in place and mint a new refresh token.
    ///
    /// With the extension policy on, the lifetime restarts at a full refresh TTL;
    /// otherwise the existing `expires_at` is kept and only the token rotates.
    pub async fn update(
        &self,
        session: &SessionRef,
        session_payload: PayloadUpdate,
        token_payload: Option<JsonMap>,
    ) -> AuthResult<SessionGrant> {
        let mut current = self
            .load(session)
            .await?
            .ok_or(AuthError::InvalidSession)?;

        let now = self.signer.now();
        if self.config.extend_expiry {
            current.expires_at = now + self.config.refresh_ttl_secs;
        }
        let remaining = current.expires_at - now;
        if remaining <= 0 {
            return Err(AuthError::InvalidSession);
        }
        session_payload.apply(&mut current.payload);

        let (refresh_token, refresh_token_record) =
            self.mint(session, token_payload, REFRESH_AUDIENCE, current.expires_at)?;
        self.persist(&current, remaining).await?;

        tracing::debug!(
            session_id = %current.session_id,
            user_id = %current.user_id,
            expires_at = current.expires_at,
            extended = self.config.extend_expiry,
            "session renewed"
        );

        Ok(SessionGrant {
            session: current,
            refresh_token,
            refresh_token_record,
        })
    }

    /// Verify a token for `audience` and load the session behind it.
    ///
    /// A valid token is not enough: the session must still be in the store.
    pub async fn resolve_session(
        &self,
        token: SessionToken<'_>,
        audience: &str,
    ) -> AuthResult<ResolvedSession> {
        let now = self.signer.now();
        let record = match token {
            SessionToken::Raw(raw) => {
                let opts = VerifyOptions::new(audience).prefixed(SESSION_TOKEN_PREFIX);
                match self.signer.verify(raw, opts) {
                    Ok(Some(record)) => record,
                    Ok(None) | Err(AuthError::MalformedToken(_)) => {
                        return Err(AuthError::InvalidAuthToken);
                    }
                    Err(e) => return Err(e),
                }
            }
            SessionToken::Record(record) => {
                if record.aud != audience || validate_window(record, now).is_err() {
                    return Err(AuthError::InvalidAuthToken);
                }
                record.clone()
            }
        };

        let (Some(uid), Some(sid)) = (record.claim_str("uid"), record.claim_str("sid")) else {
            return Err(AuthError::InvalidAuthToken);
        };

        let session = self
            .load(&SessionRef::new(sid, uid))
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let should_extend = self.should_extend(&record, now);

        Ok(ResolvedSession {
            session,
            token: record,
            should_extend,
        })
    }

    /// True when the extension policy is on and `token` has less than a fifth of
    /// the refresh TTL left.
    pub fn should_extend(&self, token: &TokenRecord, now: i64) -> bool {
        self.config.extend_expiry
            && token
                .remaining_secs(now)
                .saturating_mul(EXTEND_THRESHOLD_DIVISOR)
                < self.config.refresh_ttl_secs
    }

    pub async fn get_session(&self, session: &SessionRef) -> AuthResult<Option<Session>> {
        self.load(session).await
    }

    /// Live sessions of a user, oldest first.
    pub async fn list_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let mut sessions = self
            .store
            .list(user_id)
            .await?
            .into_iter()
            .map(|(_, value)| serde_json::from_value::<Session>(value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        sessions.retain(|s| s.user_id == user_id);
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> AuthResult<bool> {
        let deleted = self.store.delete(session_id, user_id).await?;
        tracing::info!(session_id = %session_id, user_id = %user_id, deleted, "session deleted");
        Ok(deleted)
    }

    pub async fn delete_sessions(&self, user_id: &str) -> AuthResult<bool> {
        let deleted = self.store.clear(user_id).await?;
        tracing::info!(user_id = %user_id, deleted, "all sessions deleted");
        Ok(deleted)
    }

    fn mint(
        &self,
        session: &SessionRef,
        payload: Option<JsonMap>,
        audience: &str,
        expires_at: i64,
    ) -> AuthResult<(String, TokenRecord)> {
        let mut claims = payload.unwrap_or_default();
        claims.insert("uid".into(), JsonValue::String(session.user_id.clone()));
        claims.insert("sid".into(), JsonValue::String(session.session_id.clone()));
        self.signer.issue(
            claims,
            IssueOptions::new(audience, expires_at).prefixed(SESSION_TOKEN_PREFIX),
        )
    }

    async fn load(&self, session: &SessionRef) -> AuthResult<Option<Session>> {
        let Some(value) = self.store.get(&session.session_id, &session.user_id).await? else {
            return Ok(None);
        };
        let stored: Session = serde_json::from_value(value).map_err(StoreError::from)?;
        if stored.user_id != session.user_id {
            tracing::warn!(
                session_id = %session.session_id,
                "stored session belongs to a different user"
            );
            return Ok(None);
        }
        Ok(Some(stored))
    }

    async fn persist(&self, session: &Session, ttl_secs: i64) -> AuthResult<()> {
        let value = serde_json::to_value(session).map_err(StoreError::from)?;
        let written = self
            .store
            .set(&session.session_id, &session.user_id, value, ttl_secs)
            .await?;
        if !written {
            return Err(AuthError::store(format!(
                "session {} was not persisted",
                session.session_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for SessionManager {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
            .with(Capability::ProviderIdentity)
            .with(Capability::Identity)
            .with(Capability::Health)
    }

    /// Recognises `Authorization: Bearer session:<access token>`.
    async fn resolve_provider_identity(
        &self,
        headers: &RequestHeaders,
    ) -> AuthResult<Option<ProviderIdentity>> {
        let Some(token) = headers
            .bearer_token()
            .filter(|t| t.starts_with(SESSION_TOKEN_PREFIX))
        else {
            return Ok(None);
        };

        let opts = VerifyOptions::new(ACCESS_AUDIENCE).prefixed(SESSION_TOKEN_PREFIX);
        let record = match self.signer.verify(token, opts) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(e) if e.is_rejection() => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(sid) = record.claim_str("sid").map(str::to_string) else {
            return Ok(None);
        };
        let mut data = JsonMap::new();
        data.insert("token".into(), record.to_json());
        Ok(Some(
            ProviderIdentity::new(SESSION_PROVIDER, sid).with_data(data),
        ))
    }

    /// Synthesises the identity from the session itself.
    ///
    /// `disabled` is always `false`: the identity store is not consulted per
    /// access token, so revocation means deleting sessions.
    async fn resolve_identity(
        &self,
        provider_identity: &ProviderIdentity,
    ) -> AuthResult<Option<Identity>> {
        if provider_identity.provider != SESSION_PROVIDER {
            return Ok(None);
        }
        let Some(record) = provider_identity
            .data("token")
            .and_then(TokenRecord::from_json)
        else {
            return Ok(None);
        };

        let resolved = match self
            .resolve_session(SessionToken::Record(&record), ACCESS_AUDIENCE)
            .await
        {
            Ok(resolved) => resolved,
            Err(e) if e.is_rejection() => {
                tracing::debug!(ident = %provider_identity.ident(), error = %e, "session escalation rejected");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let session = resolved.session;
        Ok(Some(Identity {
            id: session.authn_id,
            user_id: session.user_id,
            user_type: session.user_type,
            disabled: false,
            created_at: DateTime::from_timestamp(session.created_at, 0).unwrap_or_default(),
            source: provider_identity.clone(),
        }))
    }

    async fn health(&self) -> AuthResult<()> {
        if !self.signer.is_configured() {
            return Err(AuthError::configuration(
                "session provider has no token signing secret",
            ));
        }
        self.store.health().await?;
        Ok(())
    }
}

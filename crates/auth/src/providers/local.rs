//! `local` provider: bearer tokens for logins whose credentials were checked
//! elsewhere (password, magic link).
//!
//! Tokens carry `sub` = provider id. The provider only parses requests; the
//! matching [`Identity`](passage_core::Identity) comes from the identity store.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use passage_core::{AuthError, AuthResult, JsonMap, ProviderIdentity};

use crate::config::LocalTokenConfig;
use crate::provider::{Capabilities, Capability, IdentityProvider, RequestHeaders};
use crate::token::{IssueOptions, TokenRecord, TokenSigner, VerifyOptions};

pub const LOCAL_PROVIDER: &str = "local";
pub const LOCAL_TOKEN_PREFIX: &str = "local:";
pub const LOCAL_ACCESS_AUDIENCE: &str = "local:access";
pub const LOCAL_REFRESH_AUDIENCE: &str = "local:refresh";

#[derive(Debug, Clone, PartialEq)]
pub struct LocalTokens {
    pub access_token: String,
    pub access_token_record: TokenRecord,
    pub refresh_token: String,
    pub refresh_token_record: TokenRecord,
}

#[derive(Debug, Clone)]
pub struct LocalProvider {
    signer: TokenSigner,
    config: LocalTokenConfig,
}

impl LocalProvider {
    pub fn new(signer: TokenSigner, config: LocalTokenConfig) -> Self {
        Self { signer, config }
    }

    /// Mint an access/refresh pair for `provider_id`.
    pub fn issue(&self, provider_id: &str) -> AuthResult<LocalTokens> {
        let (access_token, access_token_record) = self.issue_access(provider_id)?;
        let (refresh_token, refresh_token_record) = self.mint(
            provider_id,
            LOCAL_REFRESH_AUDIENCE,
            self.config.refresh_ttl_secs,
        )?;
        Ok(LocalTokens {
            access_token,
            access_token_record,
            refresh_token,
            refresh_token_record,
        })
    }

    pub fn issue_access(&self, provider_id: &str) -> AuthResult<(String, TokenRecord)> {
        self.mint(provider_id, LOCAL_ACCESS_AUDIENCE, self.config.access_ttl_secs)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// `Ok(None)` when the refresh token is not acceptable.
    pub fn refresh(&self, refresh_token: &str) -> AuthResult<Option<(String, TokenRecord)>> {
        let Some(record) = self.verify(refresh_token, LOCAL_REFRESH_AUDIENCE)? else {
            return Ok(None);
        };
        match record.claim_str("sub") {
            Some(sub) => self.issue_access(sub).map(Some),
            None => Ok(None),
        }
    }

    fn mint(&self, provider_id: &str, audience: &str, ttl_secs: i64) -> AuthResult<(String, TokenRecord)> {
        if provider_id.trim().is_empty() {
            return Err(AuthError::validation("local token requires a provider id"));
        }
        let mut claims = JsonMap::new();
        claims.insert("sub".into(), JsonValue::String(provider_id.to_string()));
        let expires_at = self.signer.now() + ttl_secs;
        self.signer.issue(
            claims,
            IssueOptions::new(audience, expires_at).prefixed(LOCAL_TOKEN_PREFIX),
        )
    }

    fn verify(&self, raw: &str, audience: &str) -> AuthResult<Option<TokenRecord>> {
        let opts = VerifyOptions::new(audience).prefixed(LOCAL_TOKEN_PREFIX);
        match self.signer.verify(raw, opts) {
            Err(e) if e.is_rejection() => Ok(None),
            other => other,
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with(Capability::ProviderIdentity)
    }

    async fn resolve_provider_identity(
        &self,
        headers: &RequestHeaders,
    ) -> AuthResult<Option<ProviderIdentity>> {
        let Some(token) = headers
            .bearer_token()
            .filter(|t| t.starts_with(LOCAL_TOKEN_PREFIX))
        else {
            return Ok(None);
        };

        let Some(record) = self.verify(token, LOCAL_ACCESS_AUDIENCE)? else {
            return Ok(None);
        };
        let Some(sub) = record.claim_str("sub").map(str::to_string) else {
            return Ok(None);
        };

        let mut data = JsonMap::new();
        data.insert("token".into(), record.to_json());
        Ok(Some(ProviderIdentity::new(LOCAL_PROVIDER, sub).with_data(data)))
    }
}

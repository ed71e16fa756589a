//! Signed token primitive: HS256 JWTs scoped by audience and an optional wire prefix.
//!
//! The prefix is plain string concatenation in front of the JWT and is not covered
//! by the signature; it only routes a token to the flow that should try it. The
//! audience lives inside the signed payload and is what actually keeps a token
//! minted for one purpose from being accepted for another.
//!
//! Verification order matters: the payload is decoded *without* checking the
//! signature, the audience is compared, and only tokens for the requested audience
//! pay for signature verification. Every rejection after a successful decode is
//! `Ok(None)`; only input that cannot be decoded at all is an error.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use passage_core::{AuthError, AuthResult, Clock, JsonMap};

/// Decoded payload of a signed token.
///
/// `claims` holds every custom field; `iat`/`exp`/`aud` are stamped at issue time
/// and always win over custom fields with the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,

    /// Audience the token was minted for.
    pub aud: String,

    #[serde(flatten)]
    pub claims: JsonMap,
}

impl TokenRecord {
    pub fn claim(&self, key: &str) -> Option<&JsonValue> {
        self.claims.get(key)
    }

    pub fn claim_str(&self, key: &str) -> Option<&str> {
        self.claim(key).and_then(JsonValue::as_str)
    }

    /// Seconds until expiry (negative once expired).
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.exp.saturating_sub(now)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn from_json(value: &JsonValue) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate a record's time window against `now`.
pub fn validate_window(record: &TokenRecord, now: i64) -> Result<(), TokenValidationError> {
    if record.exp <= record.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now >= record.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct IssueOptions<'a> {
    /// Absolute expiry (unix seconds).
    pub expires_at: i64,
    pub audience: &'a str,
    pub prefix: Option<&'a str>,
}

impl<'a> IssueOptions<'a> {
    pub fn new(audience: &'a str, expires_at: i64) -> Self {
        Self {
            expires_at,
            audience,
            prefix: None,
        }
    }

    pub fn prefixed(mut self, prefix: &'a str) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions<'a> {
    pub audience: &'a str,
    pub prefix: Option<&'a str>,
}

impl<'a> VerifyOptions<'a> {
    pub fn new(audience: &'a str) -> Self {
        Self {
            audience,
            prefix: None,
        }
    }

    pub fn prefixed(mut self, prefix: &'a str) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and verifies signed tokens with a single shared secret.
///
/// A signer without a secret can be constructed (so boot does not depend on
/// it), but every issue/verify that reaches the signing step fails with
/// `AuthError::Configuration`.
#[derive(Clone)]
pub struct TokenSigner {
    keys: Option<Arc<SigningKeys>>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: Option<&[u8]>, clock: Arc<dyn Clock>) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| {
            Arc::new(SigningKeys {
                encoding: EncodingKey::from_secret(s),
                decoding: DecodingKey::from_secret(s),
            })
        });
        Self { keys, clock }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> i64 {
        self.clock.unix_now()
    }

    fn keys(&self) -> AuthResult<&SigningKeys> {
        self.keys.as_deref().ok_or_else(|| {
            tracing::error!("token signing secret is not configured");
            AuthError::configuration("token signing secret is not configured")
        })
    }

    /// Stamp `iat`/`exp`/`aud` onto `payload`, sign it and prepend the prefix.
    pub fn issue(&self, payload: JsonMap, opts: IssueOptions<'_>) -> AuthResult<(String, TokenRecord)> {
        let keys = self.keys()?;

        let record = TokenRecord {
            iat: self.now(),
            exp: opts.expires_at,
            aud: opts.audience.to_string(),
            claims: payload
                .into_iter()
                .filter(|(k, _)| !matches!(k.as_str(), "iat" | "exp" | "aud"))
                .collect(),
        };

        let jwt = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &record, &keys.encoding)
            .map_err(|e| AuthError::configuration(format!("token signing failed: {e}")))?;

        let token = match opts.prefix {
            Some(prefix) => format!("{prefix}{jwt}"),
            None => jwt,
        };
        Ok((token, record))
    }

    /// Verify a raw token for `opts.audience`.
    ///
    /// - `Err(MalformedToken)`: empty or undecodable input.
    /// - `Ok(None)`: wrong audience, bad signature, expired.
    /// - `Ok(Some(record))`: trusted.
    pub fn verify(&self, raw: &str, opts: VerifyOptions<'_>) -> AuthResult<Option<TokenRecord>> {
        let token = match opts.prefix {
            Some(prefix) => raw.strip_prefix(prefix).unwrap_or(raw),
            None => raw,
        };

        let untrusted = decode_unverified(token)?;
        if untrusted.get("aud").and_then(JsonValue::as_str) != Some(opts.audience) {
            tracing::trace!(expected = opts.audience, "token audience mismatch");
            return Ok(None);
        }

        let keys = self.keys()?;
        let record = match jsonwebtoken::decode::<TokenRecord>(token, &keys.decoding, &validation()) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(audience = opts.audience, error = %e, "token rejected");
                return Ok(None);
            }
        };

        if let Err(e) = validate_window(&record, self.now()) {
            tracing::debug!(audience = opts.audience, error = %e, "token rejected");
            return Ok(None);
        }

        Ok(Some(record))
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked against the injected clock and the audience has already
    // been compared before the signature check.
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;
    validation
}

/// Decode a JWT payload without verifying anything.
fn decode_unverified(token: &str) -> AuthResult<JsonMap> {
    if token.is_empty() {
        return Err(AuthError::malformed("empty token"));
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::malformed("token must have 3 parts separated by dots"));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthError::malformed(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice::<JsonMap>(&payload)
        .map_err(|e| AuthError::malformed(format!("payload is not a JSON object: {e}")))
}

//! Authentication configuration.
//!
//! Plain data with defaults; loading from the environment lives in
//! `passage-infra::config`.

use serde::{Deserialize, Serialize};

use passage_core::{AuthError, AuthResult};

/// Upper bound for every token and session lifetime (ten years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn check_ttl(what: &str, secs: i64) -> AuthResult<()> {
    if secs <= 0 {
        return Err(AuthError::configuration(format!("{what} must be positive")));
    }
    if secs > MAX_TTL_SECS {
        return Err(AuthError::configuration(format!(
            "{what} must not exceed {MAX_TTL_SECS} seconds"
        )));
    }
    Ok(())
}

/// Session lifetimes and renewal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a session and its refresh tokens, in seconds.
    pub refresh_ttl_secs: i64,

    /// Lifetime of access tokens, in seconds.
    pub access_ttl_secs: i64,

    /// Extension policy: push `expires_at` forward on renewal and report
    /// `should_extend` when a token nears the end of its life.
    pub extend_expiry: bool,
}

impl SessionConfig {
    pub const DEFAULT_REFRESH_TTL_SECS: i64 = 14 * 24 * 60 * 60;
    pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

    pub fn validate(&self) -> AuthResult<()> {
        check_ttl("session refresh TTL", self.refresh_ttl_secs)?;
        check_ttl("session access TTL", self.access_ttl_secs)?;
        if self.access_ttl_secs >= self.refresh_ttl_secs {
            return Err(AuthError::configuration(
                "session access TTL must be shorter than the refresh TTL",
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_ttl_secs: Self::DEFAULT_REFRESH_TTL_SECS,
            access_ttl_secs: Self::DEFAULT_ACCESS_TTL_SECS,
            extend_expiry: true,
        }
    }
}

/// Lifetimes of `local:` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTokenConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for LocalTokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret for every token this layer issues.
    #[serde(skip_serializing)]
    pub token_secret: Option<String>,

    pub session: SessionConfig,

    pub local: LocalTokenConfig,

    /// Register the development bypass provider. Never enable in production.
    pub debug_provider: bool,
}

impl AuthConfig {
    pub fn validate(&self) -> AuthResult<()> {
        self.session.validate()?;
        check_ttl("local access TTL", self.local.access_ttl_secs)?;
        check_ttl("local refresh TTL", self.local.refresh_ttl_secs)?;
        Ok(())
    }

    pub fn secret_bytes(&self) -> Option<&[u8]> {
        self.token_secret.as_deref().map(str::as_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AuthConfig::default().validate(), Ok(()));
        assert!(SessionConfig::default().extend_expiry);
    }

    #[test]
    fn access_ttl_must_be_shorter_than_refresh_ttl() {
        let cfg = SessionConfig {
            refresh_ttl_secs: 600,
            access_ttl_secs: 600,
            extend_expiry: true,
        };
        assert!(matches!(cfg.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn oversized_ttls_are_rejected() {
        let cfg = SessionConfig {
            refresh_ttl_secs: i64::MAX / 4,
            access_ttl_secs: 60,
            extend_expiry: true,
        };
        assert!(matches!(cfg.validate(), Err(AuthError::Configuration(_))));

        let at_bound = SessionConfig {
            refresh_ttl_secs: MAX_TTL_SECS,
            ..cfg
        };
        assert_eq!(at_bound.validate(), Ok(()));

        let local = AuthConfig {
            local: LocalTokenConfig {
                access_ttl_secs: 60,
                refresh_ttl_secs: MAX_TTL_SECS + 1,
            },
            ..Default::default()
        };
        assert!(matches!(local.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn secret_is_never_serialized() {
        let cfg = AuthConfig {
            token_secret: Some("hunter2".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("hunter2"));
    }
}

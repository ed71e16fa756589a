//! Configuration loading and representation.
//!
//! Everything comes from environment variables. [`AppConfig::from_lookup`] takes
//! any `name -> value` function so tests never touch the process environment.

use thiserror::Error;

use passage_auth::{AuthConfig, MAX_TTL_SECS, SessionConfig};

pub const AUTH_TOKEN_SECRET: &str = "AUTH_TOKEN_SECRET";
pub const SESSION_REFRESH_TTL_SECS: &str = "SESSION_REFRESH_TTL_SECS";
pub const SESSION_ACCESS_TTL_SECS: &str = "SESSION_ACCESS_TTL_SECS";
pub const SESSION_EXTEND_EXPIRY: &str = "SESSION_EXTEND_EXPIRY";
pub const AUTH_DEBUG_PROVIDER: &str = "AUTH_DEBUG_PROVIDER";
pub const REDIS_URL: &str = "REDIS_URL";
pub const REDIS_NAMESPACE: &str = "REDIS_NAMESPACE";
pub const DATABASE_URL: &str = "DATABASE_URL";

pub const DEFAULT_REDIS_NAMESPACE: &str = "passage:sessions";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Inconsistent(String),
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub auth: AuthConfig,
    /// Session TTL store; in-memory when absent.
    pub redis: Option<RedisConfig>,
    /// Identity store; in-memory when absent.
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            refresh_ttl_secs: parse_secs(SESSION_REFRESH_TTL_SECS, var(SESSION_REFRESH_TTL_SECS))?
                .unwrap_or(defaults.refresh_ttl_secs),
            access_ttl_secs: parse_secs(SESSION_ACCESS_TTL_SECS, var(SESSION_ACCESS_TTL_SECS))?
                .unwrap_or(defaults.access_ttl_secs),
            extend_expiry: parse_bool(SESSION_EXTEND_EXPIRY, var(SESSION_EXTEND_EXPIRY))?
                .unwrap_or(defaults.extend_expiry),
        };

        let auth = AuthConfig {
            token_secret: var(AUTH_TOKEN_SECRET),
            session,
            debug_provider: parse_bool(AUTH_DEBUG_PROVIDER, var(AUTH_DEBUG_PROVIDER))?
                .unwrap_or(false),
            ..AuthConfig::default()
        };
        auth.validate()
            .map_err(|e| ConfigError::Inconsistent(e.to_string()))?;

        let redis = var(REDIS_URL).map(|url| RedisConfig {
            url,
            namespace: var(REDIS_NAMESPACE).unwrap_or_else(|| DEFAULT_REDIS_NAMESPACE.to_string()),
        });

        Ok(Self {
            auth,
            redis,
            database_url: var(DATABASE_URL),
        })
    }
}

fn parse_secs(var: &'static str, raw: Option<String>) -> Result<Option<i64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(var, format!("expected whole seconds, got {raw:?}")))?;
    if secs <= 0 {
        return Err(ConfigError::invalid(var, "must be positive"));
    }
    if secs > MAX_TTL_SECS {
        return Err(ConfigError::invalid(
            var,
            format!("must not exceed {MAX_TTL_SECS} seconds"),
        ));
    }
    Ok(Some(secs))
}

fn parse_bool(var: &'static str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::invalid(var, format!("expected a boolean, got {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.auth.token_secret, None);
        assert_eq!(cfg.auth.session, SessionConfig::default());
        assert!(!cfg.auth.debug_provider);
        assert_eq!(cfg.redis, None);
        assert_eq!(cfg.database_url, None);
    }

    #[test]
    fn reads_every_variable() {
        let cfg = load(&[
            (AUTH_TOKEN_SECRET, "s3cret"),
            (SESSION_REFRESH_TTL_SECS, "3600"),
            (SESSION_ACCESS_TTL_SECS, "60"),
            (SESSION_EXTEND_EXPIRY, "off"),
            (AUTH_DEBUG_PROVIDER, "true"),
            (REDIS_URL, "redis://localhost:6379"),
            (DATABASE_URL, "postgres://localhost/passage"),
        ])
        .unwrap();

        assert_eq!(cfg.auth.secret_bytes(), Some(&b"s3cret"[..]));
        assert_eq!(cfg.auth.session.refresh_ttl_secs, 3600);
        assert_eq!(cfg.auth.session.access_ttl_secs, 60);
        assert!(!cfg.auth.session.extend_expiry);
        assert!(cfg.auth.debug_provider);
        assert_eq!(
            cfg.redis,
            Some(RedisConfig {
                url: "redis://localhost:6379".into(),
                namespace: DEFAULT_REDIS_NAMESPACE.into(),
            })
        );
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/passage"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = load(&[(AUTH_TOKEN_SECRET, "  "), (REDIS_URL, "")]).unwrap();
        assert_eq!(cfg.auth.token_secret, None);
        assert_eq!(cfg.redis, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[(SESSION_REFRESH_TTL_SECS, "two weeks")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: SESSION_REFRESH_TTL_SECS, .. }));

        let err = load(&[(SESSION_ACCESS_TTL_SECS, "-5")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: SESSION_ACCESS_TTL_SECS, .. }));

        let err = load(&[(AUTH_DEBUG_PROVIDER, "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: AUTH_DEBUG_PROVIDER, .. }));
    }

    #[test]
    fn ttls_beyond_ten_years_are_rejected() {
        let huge = (i64::MAX / 4).to_string();
        let err = load(&[(SESSION_REFRESH_TTL_SECS, huge.as_str())]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: SESSION_REFRESH_TTL_SECS, .. }));

        let max = MAX_TTL_SECS.to_string();
        let cfg = load(&[(SESSION_REFRESH_TTL_SECS, max.as_str())]).unwrap();
        assert_eq!(cfg.auth.session.refresh_ttl_secs, MAX_TTL_SECS);
    }

    #[test]
    fn access_ttl_must_stay_below_refresh_ttl() {
        let err = load(&[
            (SESSION_REFRESH_TTL_SECS, "600"),
            (SESSION_ACCESS_TTL_SECS, "900"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }
}

//! Authentication error model.

use thiserror::Error;

/// Result type used across the authentication layer.
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication-layer error.
///
/// Untrusted input that simply fails to authenticate (bad token, no matching
/// provider, unknown session) is surfaced as `None` by most operations and never
/// reaches this enum. What remains are misconfiguration, integrity problems and the
/// explicit session-manager rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Deployment misconfiguration (e.g. no signing secret).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A token string that cannot even be parsed.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// A provider identity references a provider that is not registered.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// A provider name was registered twice during boot.
    #[error("duplicate provider '{0}'")]
    DuplicateProvider(String),

    /// The presented token failed verification.
    #[error("invalid auth token")]
    InvalidAuthToken,

    /// The session backing a token does not exist (expired, evicted or deleted).
    #[error("invalid session")]
    InvalidSession,

    /// Caller-supplied data failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Failure reported by a TTL or identity store.
    #[error("store error: {0}")]
    Store(String),

    /// Failure reported by an identity provider implementation.
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },
}

impl AuthError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedToken(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for the rejections a request resolver should treat as "unauthenticated".
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidAuthToken | Self::InvalidSession | Self::MalformedToken(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_distinguished_from_misconfiguration() {
        assert!(AuthError::InvalidSession.is_rejection());
        assert!(AuthError::InvalidAuthToken.is_rejection());
        assert!(AuthError::malformed("empty").is_rejection());
        assert!(!AuthError::configuration("no secret").is_rejection());
        assert!(!AuthError::UnknownProvider("x".into()).is_rejection());
    }

    #[test]
    fn provider_error_message_names_the_provider() {
        let err = AuthError::provider("google", "introspection timed out");
        assert_eq!(
            err.to_string(),
            "provider 'google' failed: introspection timed out"
        );
    }
}

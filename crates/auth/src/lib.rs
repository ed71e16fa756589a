//! `passage-auth`: pluggable authentication and session layer.
//!
//! This crate is decoupled from HTTP: callers hand in request headers and get back
//! an [`AuthContext`]. Persistence goes through the `passage-store` traits.

pub mod config;
pub mod context;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod token;

pub use config::{AuthConfig, LocalTokenConfig, MAX_TTL_SECS, SessionConfig};
pub use context::AuthContext;
pub use provider::{Capabilities, Capability, IdentityProvider, RequestHeaders};
pub use providers::{DEBUG_PROVIDER, DebugProvider, LOCAL_PROVIDER, LocalProvider, LocalTokens};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use resolver::{IdentityResolver, ProviderFilter, ProviderHealth};
pub use session::{
    ACCESS_AUDIENCE, AccessGrant, PayloadUpdate, REFRESH_AUDIENCE, ResolvedSession,
    SESSION_PROVIDER, SESSION_TOKEN_PREFIX, Session, SessionGrant, SessionManager, SessionRef,
    SessionSubject, SessionToken,
};
pub use token::{
    IssueOptions, TokenRecord, TokenSigner, TokenValidationError, VerifyOptions, validate_window,
};

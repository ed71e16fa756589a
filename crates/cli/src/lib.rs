//! `passage` operator commands.
//!
//! Every command prints one JSON document. Without `REDIS_URL`/`DATABASE_URL`
//! the stores are in-memory and die with the process.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value as JsonValue, json};

use passage_auth::{
    ACCESS_AUDIENCE, AuthContext, PayloadUpdate, ProviderFilter, REFRESH_AUDIENCE, RequestHeaders,
    SessionRef, SessionSubject,
};
use passage_infra::AuthStack;

/// Passage - session and identity administration
#[derive(Debug, Parser)]
#[command(name = "passage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Report the health of every registered provider
    Health,

    /// Resolve a bearer token through the provider chain
    Whoami {
        /// Token as sent in the Authorization header
        token: String,
    },

    /// Server-side sessions
    #[command(subcommand)]
    Session(SessionCommands),

    /// Locally issued tokens
    #[command(subcommand)]
    Local(LocalCommands),
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SessionCommands {
    /// Open a session and print its refresh token
    Create {
        user_id: String,
        authn_id: String,
        #[arg(default_value = "user")]
        user_type: String,
    },

    /// Mint an access token for a live session
    Access { session_id: String, user_id: String },

    /// Renew a session and rotate its refresh token
    Renew { session_id: String, user_id: String },

    /// Verify a session token and load its session
    Resolve {
        token: String,
        #[arg(value_enum, default_value_t = TokenKind::Refresh)]
        kind: TokenKind,
    },

    /// List a user's sessions
    List { user_id: String },

    /// Delete one session
    Revoke { session_id: String, user_id: String },

    /// Delete every session of a user
    RevokeAll { user_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum LocalCommands {
    /// Issue an access/refresh pair for a provider id
    Issue { provider_id: String },

    /// Exchange a refresh token for a new access token
    Refresh { token: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TokenKind {
    #[default]
    Refresh,
    Access,
}

impl TokenKind {
    pub fn audience(self) -> &'static str {
        match self {
            TokenKind::Refresh => REFRESH_AUDIENCE,
            TokenKind::Access => ACCESS_AUDIENCE,
        }
    }
}

/// Execute `command` against a wired stack.
pub async fn run(stack: &AuthStack, command: Commands) -> anyhow::Result<JsonValue> {
    match command {
        Commands::Health => {
            let report: Vec<JsonValue> = stack
                .resolver
                .health()
                .await
                .into_iter()
                .map(|h| {
                    json!({
                        "provider": h.provider,
                        "healthy": h.error.is_none(),
                        "error": h.error.map(|e| e.to_string()),
                    })
                })
                .collect();
            Ok(json!({ "providers": report }))
        }
        Commands::Whoami { token } => {
            let mut ctx = AuthContext::new();
            let identity = stack
                .resolver
                .authenticate(&mut ctx, &RequestHeaders::bearer(&token), &ProviderFilter::Any)
                .await?;
            Ok(json!({
                "providerIdentity": ctx.provider_identity(),
                "identity": identity,
                "ident": ctx.ident(),
            }))
        }
        Commands::Session(command) => run_session(stack, command).await,
        Commands::Local(command) => run_local(stack, command),
    }
}

async fn run_session(stack: &AuthStack, command: SessionCommands) -> anyhow::Result<JsonValue> {
    let output = match command {
        SessionCommands::Create {
            user_id,
            authn_id,
            user_type,
        } => {
            let subject = SessionSubject {
                user_id,
                authn_id,
                user_type,
            };
            let grant = stack.sessions.create(subject, None, None).await?;
            tracing::info!(session_id = %grant.session.session_id, "session created from cli");
            json!({
                "session": grant.session,
                "refreshToken": grant.refresh_token,
                "refreshTokenRecord": grant.refresh_token_record,
            })
        }
        SessionCommands::Access {
            session_id,
            user_id,
        } => {
            let session = SessionRef::new(session_id, user_id);
            stack
                .sessions
                .get_session(&session)
                .await?
                .context("session not found")?;
            let grant = stack.sessions.create_access_token(&session, None)?;
            json!({
                "accessToken": grant.access_token,
                "accessTokenRecord": grant.access_token_record,
            })
        }
        SessionCommands::Renew {
            session_id,
            user_id,
        } => {
            let grant = stack
                .sessions
                .update(&SessionRef::new(session_id, user_id), PayloadUpdate::Keep, None)
                .await?;
            json!({
                "session": grant.session,
                "refreshToken": grant.refresh_token,
                "refreshTokenRecord": grant.refresh_token_record,
            })
        }
        SessionCommands::Resolve { token, kind } => {
            let resolved = stack
                .sessions
                .resolve_session(token.as_str().into(), kind.audience())
                .await?;
            json!({
                "session": resolved.session,
                "token": resolved.token,
                "shouldExtend": resolved.should_extend,
            })
        }
        SessionCommands::List { user_id } => {
            json!({ "sessions": stack.sessions.list_sessions(&user_id).await? })
        }
        SessionCommands::Revoke {
            session_id,
            user_id,
        } => {
            json!({ "deleted": stack.sessions.delete_session(&session_id, &user_id).await? })
        }
        SessionCommands::RevokeAll { user_id } => {
            json!({ "deleted": stack.sessions.delete_sessions(&user_id).await? })
        }
    };
    Ok(output)
}

fn run_local(stack: &AuthStack, command: LocalCommands) -> anyhow::Result<JsonValue> {
    let output = match command {
        LocalCommands::Issue { provider_id } => {
            let tokens = stack.local.issue(&provider_id)?;
            json!({
                "accessToken": tokens.access_token,
                "accessTokenRecord": tokens.access_token_record,
                "refreshToken": tokens.refresh_token,
                "refreshTokenRecord": tokens.refresh_token_record,
            })
        }
        LocalCommands::Refresh { token } => {
            let (access_token, record) = stack
                .local
                .refresh(&token)?
                .context("refresh token rejected")?;
            json!({
                "accessToken": access_token,
                "accessTokenRecord": record,
            })
        }
    };
    Ok(output)
}

// Error taxonomy for the auth handler.
//
// Two layers: `AuthError` is the internal error type carrying full detail
// for server logs, and `ErrorPageParam` is the coarse, fixed enum exposed
// to browsers through the `error` query parameter of the error surface.
// Internal detail must never leak into redirect URLs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal error type used throughout the handler.
///
/// Variants follow the propagation rules of each failure class: config
/// errors are fatal for the request, check failures reject the request
/// with a generic message, decode failures are treated as "absent".
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Misconfiguration detected at init or request time (missing secret,
    /// provider without endpoints, credentials under database strategy).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A storage adapter call failed. `method` names the offending call so
    /// the failure can be logged with its context.
    #[error("Adapter error in {method}: {message}")]
    Adapter {
        method: &'static str,
        message: String,
    },

    /// Key derivation, encryption, or random generation failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A sealed token failed integrity or freshness checks. Callers treat
    /// the token as absent and clean up its cookie.
    #[error("Token decode failed: {0}")]
    Decode(String),

    /// A one-time check (state, nonce, pkce, challenge, csrf) was missing,
    /// unparsable, or mismatched. The check name stays server-side.
    #[error("Invalid \"{0}\" check")]
    InvalidCheck(&'static str),

    /// The authorization server misbehaved: error callback parameter,
    /// failed token or userinfo request, unusable profile.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Unified result type for gatehouse operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// The fixed, client-visible error vocabulary.
///
/// Every failure redirect carries exactly one of these as the `error`
/// query parameter. The set is closed on purpose: fine-grained causes are
/// logged server-side only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorPageParam {
    Signin,
    OAuthSignin,
    OAuthCallback,
    OAuthAccountNotLinked,
    Callback,
    Configuration,
    AccessDenied,
    Verification,
    CredentialsSignin,
    SessionRequired,
    EmailSignin,
}

impl ErrorPageParam {
    /// The exact query-string form of this error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signin => "Signin",
            Self::OAuthSignin => "OAuthSignin",
            Self::OAuthCallback => "OAuthCallback",
            Self::OAuthAccountNotLinked => "OAuthAccountNotLinked",
            Self::Callback => "Callback",
            Self::Configuration => "Configuration",
            Self::AccessDenied => "AccessDenied",
            Self::Verification => "Verification",
            Self::CredentialsSignin => "CredentialsSignin",
            Self::SessionRequired => "SessionRequired",
            Self::EmailSignin => "EmailSignin",
        }
    }

    /// Parse a query parameter back into the enum, defaulting unknown
    /// values to `Configuration` so the error surface never 500s.
    pub fn parse(value: &str) -> Self {
        match value {
            "Signin" => Self::Signin,
            "OAuthSignin" => Self::OAuthSignin,
            "OAuthCallback" => Self::OAuthCallback,
            "OAuthAccountNotLinked" => Self::OAuthAccountNotLinked,
            "Callback" => Self::Callback,
            "AccessDenied" => Self::AccessDenied,
            "Verification" => Self::Verification,
            "CredentialsSignin" => Self::CredentialsSignin,
            "SessionRequired" => Self::SessionRequired,
            "EmailSignin" => Self::EmailSignin,
            _ => Self::Configuration,
        }
    }
}

impl fmt::Display for ErrorPageParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Storage adapter contract.
//
// Callers supply the persistence backend as a trait object. The capability
// surface is split in two: `PartialAdapter` covers users and linked
// accounts (enough for sealed-token sessions), `FullAdapter` adds sessions
// and verification tokens (required for the database session strategy and
// the email provider). Which half a configuration needs is asserted once
// at init time, never at call sites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result type for adapter operations. The message is backend-specific;
/// the engine wraps it with the offending method name before logging.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Error returned by adapter implementations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct AdapterError(pub String);

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ─── Records ────────────────────────────────────────────────────

/// A user record as the storage backend sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A provider account linked to a user.
///
/// `provider_account_id` is the user's id at the provider; together with
/// `provider` it uniquely identifies the link. The token fields hold the
/// raw token set from the most recent sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterAccount {
    pub user_id: String,
    /// Provider id, e.g. "github".
    pub provider: String,
    /// Provider kind: "oidc", "oauth", "email", "credentials" or "webauthn".
    #[serde(rename = "type")]
    pub account_type: String,
    pub provider_account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token, seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
}

/// A session record under the database strategy. The cookie holds only
/// `session_token`; this record is the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSession {
    pub session_token: String,
    pub user_id: String,
    pub expires: DateTime<Utc>,
}

/// A single-use verification token (email magic links).
///
/// `token` is stored hashed; the raw value only ever travels in the email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

// ─── Traits ─────────────────────────────────────────────────────

/// User and account persistence. Sufficient for sealed-token sessions
/// with OAuth providers.
#[async_trait]
pub trait PartialAdapter: Send + Sync {
    /// Create a user. The `id` field of the input may be empty; the
    /// backend assigns one and returns the stored record.
    async fn create_user(&self, user: AdapterUser) -> AdapterResult<AdapterUser>;

    async fn get_user(&self, id: &str) -> AdapterResult<Option<AdapterUser>>;

    async fn get_user_by_email(&self, email: &str) -> AdapterResult<Option<AdapterUser>>;

    /// Look up the user owning the `(provider, provider_account_id)` link.
    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AdapterResult<Option<AdapterUser>>;

    async fn update_user(&self, user: AdapterUser) -> AdapterResult<AdapterUser>;

    async fn link_account(&self, account: AdapterAccount) -> AdapterResult<()>;
}

/// Full persistence: users/accounts plus sessions and verification tokens.
#[async_trait]
pub trait FullAdapter: PartialAdapter {
    async fn create_session(&self, session: AdapterSession) -> AdapterResult<AdapterSession>;

    /// Fetch the session record and its user in one call.
    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> AdapterResult<Option<(AdapterSession, AdapterUser)>>;

    /// Update mutable session fields (currently only `expires`). Returns
    /// the updated record, or None when the session no longer exists.
    async fn update_session(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> AdapterResult<Option<AdapterSession>>;

    async fn delete_session(&self, session_token: &str) -> AdapterResult<()>;

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> AdapterResult<VerificationToken>;

    /// Atomically fetch-and-delete a verification token. Returns None when
    /// no matching token exists (already used, or never issued).
    async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> AdapterResult<Option<VerificationToken>>;
}

// ─── Capability sum type ────────────────────────────────────────

/// The storage capability a configuration was built with.
///
/// Checked once during init: the database session strategy and the email
/// provider require `Full`; everything else works with `Partial` or
/// `Disabled` (sealed-token sessions only, no persistence).
#[derive(Clone)]
pub enum Storage {
    Full(Arc<dyn FullAdapter>),
    Partial(Arc<dyn PartialAdapter>),
    Disabled,
}

impl Storage {
    /// The full adapter, when available.
    pub fn full(&self) -> Option<&Arc<dyn FullAdapter>> {
        match self {
            Storage::Full(adapter) => Some(adapter),
            _ => None,
        }
    }

    /// The user/account surface, when any storage is configured.
    pub fn users(&self) -> Option<&dyn PartialAdapter> {
        match self {
            Storage::Full(adapter) => Some(&**adapter),
            Storage::Partial(adapter) => Some(&**adapter),
            Storage::Disabled => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Storage::Disabled)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Storage::Full(_) => "Full",
            Storage::Partial(_) => "Partial",
            Storage::Disabled => "Disabled",
        };
        f.debug_tuple("Storage").field(&kind).finish()
    }
}

// Logged storage operations.
//
// Thin wrapper over the adapter capability that (a) asserts the required
// capability is present, (b) converts backend errors into `AuthError`
// with the offending method name attached, and (c) logs method + args at
// debug level so one failing storage call never takes the process down.

use chrono::{DateTime, Utc};

use gatehouse_core::adapter::{
    AdapterAccount, AdapterError, AdapterSession, AdapterUser, FullAdapter, PartialAdapter,
    Storage, VerificationToken,
};
use gatehouse_core::error::{AuthError, Result};
use gatehouse_core::logger::AuthLogger;

pub struct StorageOps<'a> {
    pub storage: &'a Storage,
    pub logger: &'a AuthLogger,
}

impl StorageOps<'_> {
    fn wrap(&self, method: &'static str, args: &str, error: AdapterError) -> AuthError {
        self.logger
            .debug(&format!("adapter.{method}({args}) failed: {error}"));
        AuthError::Adapter {
            method,
            message: error.0,
        }
    }

    fn users(&self, method: &'static str) -> Result<&dyn PartialAdapter> {
        self.storage.users().ok_or_else(|| {
            AuthError::Config(format!("adapter.{method} requires a storage adapter"))
        })
    }

    fn full(&self, method: &'static str) -> Result<&dyn FullAdapter> {
        match self.storage.full() {
            Some(adapter) => Ok(&**adapter),
            None => Err(AuthError::Config(format!(
                "adapter.{method} requires a full storage adapter"
            ))),
        }
    }

    // ─── Users and accounts ─────────────────────────────────────

    pub async fn create_user(&self, user: AdapterUser) -> Result<AdapterUser> {
        let args = format!("email={:?}", user.email);
        self.users("create_user")?
            .create_user(user)
            .await
            .map_err(|e| self.wrap("create_user", &args, e))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<AdapterUser>> {
        self.users("get_user_by_email")?
            .get_user_by_email(email)
            .await
            .map_err(|e| self.wrap("get_user_by_email", &format!("email={email:?}"), e))
    }

    pub async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<AdapterUser>> {
        self.users("get_user_by_account")?
            .get_user_by_account(provider, provider_account_id)
            .await
            .map_err(|e| {
                self.wrap(
                    "get_user_by_account",
                    &format!("provider={provider:?}, providerAccountId={provider_account_id:?}"),
                    e,
                )
            })
    }

    pub async fn update_user(&self, user: AdapterUser) -> Result<AdapterUser> {
        let args = format!("id={:?}", user.id);
        self.users("update_user")?
            .update_user(user)
            .await
            .map_err(|e| self.wrap("update_user", &args, e))
    }

    pub async fn link_account(&self, account: AdapterAccount) -> Result<()> {
        let args = format!(
            "provider={:?}, providerAccountId={:?}",
            account.provider, account.provider_account_id
        );
        self.users("link_account")?
            .link_account(account)
            .await
            .map_err(|e| self.wrap("link_account", &args, e))
    }

    // ─── Sessions ───────────────────────────────────────────────

    pub async fn create_session(&self, session: AdapterSession) -> Result<AdapterSession> {
        let args = format!("userId={:?}", session.user_id);
        self.full("create_session")?
            .create_session(session)
            .await
            .map_err(|e| self.wrap("create_session", &args, e))
    }

    pub async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(AdapterSession, AdapterUser)>> {
        self.full("get_session_and_user")?
            .get_session_and_user(session_token)
            .await
            .map_err(|e| self.wrap("get_session_and_user", "sessionToken=[redacted]", e))
    }

    pub async fn update_session(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<Option<AdapterSession>> {
        let args = format!("expires={expires}");
        self.full("update_session")?
            .update_session(session_token, expires)
            .await
            .map_err(|e| self.wrap("update_session", &args, e))
    }

    pub async fn delete_session(&self, session_token: &str) -> Result<()> {
        self.full("delete_session")?
            .delete_session(session_token)
            .await
            .map_err(|e| self.wrap("delete_session", "sessionToken=[redacted]", e))
    }

    // ─── Verification tokens ────────────────────────────────────

    pub async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<VerificationToken> {
        let args = format!("identifier={:?}", token.identifier);
        self.full("create_verification_token")?
            .create_verification_token(token)
            .await
            .map_err(|e| self.wrap("create_verification_token", &args, e))
    }

    pub async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>> {
        self.full("use_verification_token")?
            .use_verification_token(identifier, token)
            .await
            .map_err(|e| {
                self.wrap(
                    "use_verification_token",
                    &format!("identifier={identifier:?}"),
                    e,
                )
            })
    }
}

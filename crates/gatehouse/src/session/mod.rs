// Session manager.
//
// Two mutually exclusive strategies, fixed per configuration: the session
// either lives entirely in a sealed token inside the (possibly chunked)
// session cookie, or the cookie holds an opaque token pointing at an
// authoritative storage record. Reads refresh expiry; database writes are
// throttled to once per update-age window.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::adapter::{AdapterSession, AdapterUser};
use gatehouse_core::error::Result;
use gatehouse_core::options::SessionStrategy;

use crate::context::AuthContext;
use crate::cookies::{chunks, CookieJar};
use crate::crypto::sealed;

const SESSION_SALT: &str = "session-token";

/// Claims sealed into the cookie under the jwt strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl SessionTokenPayload {
    pub fn from_user(user: &AdapterUser) -> Self {
        Self {
            sub: Some(user.id.clone()),
            name: user.name.clone(),
            email: user.email.clone(),
            picture: user.image.clone(),
        }
    }
}

/// The session as reported to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionView {
    pub user: SessionUser,
    /// ISO 8601 expiry.
    pub expires: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SessionUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn view(name: Option<String>, email: Option<String>, image: Option<String>, expires: DateTime<Utc>) -> SessionView {
    SessionView {
        user: SessionUser { name, email, image },
        expires: expires.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }
}

/// Write the session value through the cookie codec, expiring any chunk
/// names from a previous write that the fresh one no longer covers.
fn write_session_cookie(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
    value: &str,
) {
    let base = &ctx.cookies.session_token;
    let fresh = chunks::chunk(&base.name, value);
    for stale in chunks::stale_chunk_names(request_cookies, &base.name, &fresh) {
        jar.delete_name(&stale, base);
    }
    for chunk in fresh {
        jar.set(&chunk.name, base.to_attributes(&chunk.value));
    }
}

/// Expire the session cookie and every chunk of it the request carried.
pub fn clear_session_cookie(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) {
    let base = &ctx.cookies.session_token;
    jar.delete(base);
    for stale in chunks::stale_chunk_names(request_cookies, &base.name, &[]) {
        jar.delete_name(&stale, base);
    }
}

/// Mint the session artifact for an authenticated user.
///
/// Adapter failures propagate: a sign-in whose persistence is unconfirmed
/// must not be treated as authenticated.
pub async fn create_session(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
    user: &AdapterUser,
) -> Result<()> {
    let max_age = ctx.session_config.max_age;

    match ctx.session_config.strategy {
        SessionStrategy::Jwt => {
            let payload = SessionTokenPayload::from_user(user);
            let token = sealed::encode(&payload, &ctx.secrets, SESSION_SALT, max_age)?;
            write_session_cookie(ctx, request_cookies, jar, &token);
        }
        SessionStrategy::Database => {
            let session = AdapterSession {
                session_token: uuid::Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                expires: Utc::now() + TimeDelta::seconds(max_age),
            };
            let stored = ctx.store().create_session(session).await?;
            write_session_cookie(ctx, request_cookies, jar, &stored.session_token);
        }
    }

    Ok(())
}

/// Read the current session, refreshing its expiry as a side effect.
///
/// Returns None for every non-session outcome: absent cookie, failed
/// decode (cookie cleaned up), expired record (record deleted), storage
/// unavailable (logged, cookie left alone).
pub async fn get_session(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> Result<Option<SessionView>> {
    let Some(value) = chunks::reconstruct(request_cookies, &ctx.cookies.session_token.name)
    else {
        return Ok(None);
    };

    match ctx.session_config.strategy {
        SessionStrategy::Jwt => {
            let payload: SessionTokenPayload =
                match sealed::decode(&value, &ctx.secrets, SESSION_SALT) {
                    Ok(payload) => payload,
                    Err(e) => {
                        ctx.logger.debug(&format!("session token rejected: {e}"));
                        clear_session_cookie(ctx, request_cookies, jar);
                        return Ok(None);
                    }
                };

            // Re-seal with a fresh expiry on every successful read.
            let expires = Utc::now() + TimeDelta::seconds(ctx.session_config.max_age);
            let token =
                sealed::encode(&payload, &ctx.secrets, SESSION_SALT, ctx.session_config.max_age)?;
            write_session_cookie(ctx, request_cookies, jar, &token);

            Ok(Some(view(payload.name, payload.email, payload.picture, expires)))
        }
        SessionStrategy::Database => {
            let found = match ctx.store().get_session_and_user(&value).await {
                Ok(found) => found,
                Err(e) => {
                    ctx.logger
                        .warn(&format!("session lookup unavailable: {e}"));
                    return Ok(None);
                }
            };

            let Some((session, user)) = found else {
                clear_session_cookie(ctx, request_cookies, jar);
                return Ok(None);
            };

            let now = Utc::now();
            if session.expires <= now {
                if let Err(e) = ctx.store().delete_session(&session.session_token).await {
                    ctx.logger
                        .debug(&format!("expired session cleanup failed: {e}"));
                }
                clear_session_cookie(ctx, request_cookies, jar);
                return Ok(None);
            }

            // Throttled sliding window: extend only when more than
            // update_age has passed since the session was last extended.
            let refresh_due = session.expires
                - TimeDelta::seconds(ctx.session_config.max_age)
                + TimeDelta::seconds(ctx.session_config.update_age);

            let mut expires = session.expires;
            if now >= refresh_due {
                let new_expires = now + TimeDelta::seconds(ctx.session_config.max_age);
                match ctx
                    .store()
                    .update_session(&session.session_token, new_expires)
                    .await
                {
                    Ok(Some(updated)) => expires = updated.expires,
                    Ok(None) => {}
                    Err(e) => {
                        ctx.logger
                            .warn(&format!("session refresh not persisted: {e}"));
                    }
                }
                write_session_cookie(ctx, request_cookies, jar, &session.session_token);
            }

            Ok(Some(view(user.name, user.email, user.image, expires)))
        }
    }
}

/// Terminate the session: delete the storage record where one exists,
/// then clear the cookie regardless of whether deletion succeeded.
pub async fn destroy_session(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) {
    if ctx.session_config.strategy == SessionStrategy::Database {
        if let Some(token) = chunks::reconstruct(request_cookies, &ctx.cookies.session_token.name)
        {
            if let Err(e) = ctx.store().delete_session(&token).await {
                ctx.logger
                    .debug(&format!("session deletion on sign-out failed: {e}"));
            }
        }
    }
    clear_session_cookie(ctx, request_cookies, jar);
}

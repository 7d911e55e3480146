// OAuth checks engine.
//
// One-time, sealed cookies carrying the in-flight `state`, `nonce`, PKCE
// `code_verifier`, and WebAuthn challenge. Each sub-protocol has `create`
// (no-op unless the provider lists the check) and `use`: look up the
// cookie, fail hard when required-but-absent or unparsable, and always
// schedule the cookie's deletion in the same response so a value can
// never be consumed twice. The cookies are the only server memory for an
// in-flight flow; swapping in server-side storage would only change this
// module.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use gatehouse_core::error::{AuthError, Result};

use crate::context::AuthContext;
use crate::cookies::{AuthCookie, CookieJar, CHECK_COOKIE_MAX_AGE};
use crate::crypto::{generate_random_string, sealed};
use crate::providers::{Check, OAuthProvider};

/// Payload of the nonce, PKCE, and challenge cookies.
#[derive(Debug, Serialize, Deserialize)]
struct CheckPayload {
    value: String,
}

/// Payload of the state cookie and of proxied state parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePayload {
    pub value: String,
    /// Original callback target when the flow runs through a redirect
    /// proxy; the proxy host uses it to forward the browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

fn seal_into_cookie<T: Serialize>(
    ctx: &AuthContext,
    cookie: &AuthCookie,
    salt: &str,
    payload: &T,
    jar: &mut CookieJar,
) -> Result<()> {
    let token = sealed::encode(payload, &ctx.secrets, salt, CHECK_COOKIE_MAX_AGE)?;
    jar.set_cookie(cookie, &token);
    Ok(())
}

/// Consume a check cookie: schedule deletion unconditionally, then decode.
fn take_cookie<T: DeserializeOwned>(
    ctx: &AuthContext,
    request_cookies: &HashMap<String, String>,
    cookie: &AuthCookie,
    salt: &str,
    check: &'static str,
    jar: &mut CookieJar,
) -> Result<T> {
    jar.delete(cookie);
    let raw = request_cookies
        .get(&cookie.name)
        .ok_or(AuthError::InvalidCheck(check))?;
    sealed::decode(raw, &ctx.secrets, salt).map_err(|_| AuthError::InvalidCheck(check))
}

/// S256 code challenge for a PKCE verifier.
pub fn generate_code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

// ─── state ──────────────────────────────────────────────────────

pub mod state {
    use super::*;

    const SALT: &str = "state";

    /// Create the state check. Returns the value for the authorization
    /// URL's `state` parameter, or None when the provider skips the check.
    ///
    /// Under a redirect proxy the URL parameter is itself a sealed payload
    /// carrying the originating callback URL; the cookie always holds just
    /// the random value.
    pub fn create(
        ctx: &AuthContext,
        provider: &OAuthProvider,
        jar: &mut CookieJar,
    ) -> Result<Option<String>> {
        if !provider.requires_check(Check::State) {
            return Ok(None);
        }

        let value = generate_random_string(32);
        seal_into_cookie(
            ctx,
            &ctx.cookies.state,
            SALT,
            &StatePayload {
                value: value.clone(),
                origin: None,
            },
            jar,
        )?;

        let param = if provider.use_redirect_proxy && ctx.options.redirect_proxy_url.is_some() {
            sealed::encode(
                &StatePayload {
                    value,
                    origin: Some(ctx.provider_callback_url(&provider.id)),
                },
                &ctx.secrets,
                SALT,
                CHECK_COOKIE_MAX_AGE,
            )?
        } else {
            value
        };

        Ok(Some(param))
    }

    /// Consume the state cookie at callback time.
    pub fn use_check(
        ctx: &AuthContext,
        request_cookies: &HashMap<String, String>,
        jar: &mut CookieJar,
    ) -> Result<StatePayload> {
        take_cookie(ctx, request_cookies, &ctx.cookies.state, SALT, "state", jar)
    }

    /// Decode a proxied `state` query parameter.
    pub fn decode_param(ctx: &AuthContext, param: &str) -> Result<StatePayload> {
        sealed::decode(param, &ctx.secrets, SALT).map_err(|_| AuthError::InvalidCheck("state"))
    }
}

// ─── nonce ──────────────────────────────────────────────────────

pub mod nonce {
    use super::*;

    const SALT: &str = "nonce";

    /// Create the nonce check. Returns the `nonce` parameter value, or
    /// None when the provider skips the check.
    pub fn create(
        ctx: &AuthContext,
        provider: &OAuthProvider,
        jar: &mut CookieJar,
    ) -> Result<Option<String>> {
        if !provider.requires_check(Check::Nonce) {
            return Ok(None);
        }
        let value = generate_random_string(32);
        seal_into_cookie(
            ctx,
            &ctx.cookies.nonce,
            SALT,
            &CheckPayload { value: value.clone() },
            jar,
        )?;
        Ok(Some(value))
    }

    /// Consume the nonce cookie; the value is compared against the ID
    /// token's `nonce` claim.
    pub fn use_check(
        ctx: &AuthContext,
        request_cookies: &HashMap<String, String>,
        jar: &mut CookieJar,
    ) -> Result<String> {
        let payload: CheckPayload =
            take_cookie(ctx, request_cookies, &ctx.cookies.nonce, SALT, "nonce", jar)?;
        Ok(payload.value)
    }
}

// ─── pkce ───────────────────────────────────────────────────────

pub mod pkce {
    use super::*;

    const SALT: &str = "pkce.code_verifier";
    const VERIFIER_LENGTH: usize = 64;

    /// Create the PKCE check. Seals the verifier into its cookie and
    /// returns the derived S256 challenge for the authorization URL, or
    /// None when the provider skips the check.
    pub fn create(
        ctx: &AuthContext,
        provider: &OAuthProvider,
        jar: &mut CookieJar,
    ) -> Result<Option<String>> {
        if !provider.requires_check(Check::Pkce) {
            return Ok(None);
        }
        let verifier = generate_random_string(VERIFIER_LENGTH);
        seal_into_cookie(
            ctx,
            &ctx.cookies.pkce_code_verifier,
            SALT,
            &CheckPayload {
                value: verifier.clone(),
            },
            jar,
        )?;
        Ok(Some(generate_code_challenge(&verifier)))
    }

    /// Consume the verifier cookie for the token exchange.
    pub fn use_check(
        ctx: &AuthContext,
        request_cookies: &HashMap<String, String>,
        jar: &mut CookieJar,
    ) -> Result<String> {
        let payload: CheckPayload = take_cookie(
            ctx,
            request_cookies,
            &ctx.cookies.pkce_code_verifier,
            SALT,
            "pkce",
            jar,
        )?;
        Ok(payload.value)
    }
}

// ─── webauthn challenge ─────────────────────────────────────────

pub mod challenge {
    use super::*;

    const SALT: &str = "challenge";

    /// Mint a WebAuthn challenge, sealing it into its cookie. Returns the
    /// raw challenge for the client options.
    pub fn create(ctx: &AuthContext, jar: &mut CookieJar) -> Result<String> {
        let value = generate_random_string(43);
        seal_into_cookie(
            ctx,
            &ctx.cookies.webauthn_challenge,
            SALT,
            &CheckPayload { value: value.clone() },
            jar,
        )?;
        Ok(value)
    }

    /// Consume the challenge cookie when verifying an assertion.
    pub fn use_check(
        ctx: &AuthContext,
        request_cookies: &HashMap<String, String>,
        jar: &mut CookieJar,
    ) -> Result<String> {
        let payload: CheckPayload = take_cookie(
            ctx,
            request_cookies,
            &ctx.cookies.webauthn_challenge,
            SALT,
            "challenge",
            jar,
        )?;
        Ok(payload.value)
    }
}

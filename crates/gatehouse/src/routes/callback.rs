// Callback route: stage 2 of every sign-in flow.
//
// OAuth callbacks validate the returned state and PKCE material, exchange
// the code, map the profile, resolve the user, and mint a session. Email
// callbacks consume the magic-link token. Credentials and WebAuthn verify
// caller-supplied material. Every failure redirects to the error surface
// with a coarse parameter; which specific check failed never reaches the
// client.

use std::collections::HashMap;

use chrono::Utc;

use gatehouse_core::adapter::{AdapterAccount, AdapterUser};
use gatehouse_core::error::{AuthError, Result};
use gatehouse_core::ErrorPageParam;

use crate::checks;
use crate::context::AuthContext;
use crate::cookies::CookieJar;
use crate::crypto::{constant_time_equal, hash_verification_token};
use crate::oauth::{self, id_token, ProviderMetadata, TokenRequest, TokenSet};
use crate::providers::{
    default_profile, CredentialsProvider, EmailProvider, OAuthKind, OAuthProvider, Provider,
    WebAuthnProvider,
};
use crate::routes::{error_redirect, RouteOutcome};
use crate::session;

/// Everything the router extracted from the callback request.
#[derive(Debug, Default)]
pub struct CallbackRequest {
    pub query: HashMap<String, String>,
    pub body: serde_json::Value,
    pub csrf_verified: bool,
}

pub async fn handle_callback(
    ctx: &AuthContext,
    provider_id: &str,
    request: CallbackRequest,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> RouteOutcome {
    // The callback-url cookie is one-shot: read, re-validate, clear.
    let redirect_target = request_cookies
        .get(&ctx.cookies.callback_url.name)
        .filter(|target| ctx.is_trusted_redirect(target))
        .cloned()
        .unwrap_or_else(|| ctx.resolve_redirect(None));
    jar.delete(&ctx.cookies.callback_url);

    let Some(provider) = ctx.provider(provider_id).cloned() else {
        ctx.logger
            .warn(&format!("callback for unknown provider \"{provider_id}\""));
        return error_redirect(ctx, ErrorPageParam::Callback);
    };

    match provider {
        Provider::OAuth(p) => {
            oauth_callback(ctx, &p, &request.query, request_cookies, jar, &redirect_target).await
        }
        Provider::Email(p) => {
            email_callback(ctx, &p, &request.query, request_cookies, jar, &redirect_target).await
        }
        Provider::Credentials(p) => {
            credentials_callback(
                ctx,
                &p,
                request.body,
                request.csrf_verified,
                &redirect_target,
                request_cookies,
                jar,
            )
            .await
        }
        Provider::WebAuthn(p) => {
            webauthn_callback(
                ctx,
                &p,
                request.body,
                request.csrf_verified,
                &redirect_target,
                request_cookies,
                jar,
            )
            .await
        }
    }
}

// ─── OAuth ──────────────────────────────────────────────────────

fn rebuild_query(query: &HashMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn oauth_callback(
    ctx: &AuthContext,
    provider: &OAuthProvider,
    query: &HashMap<String, String>,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
    redirect_target: &str,
) -> RouteOutcome {
    // Provider signalled an error in the callback query.
    if let Some(error) = query.get("error") {
        ctx.logger.warn(&format!(
            "provider \"{}\" returned error \"{}\": {}",
            provider.id,
            error,
            query.get("error_description").map(String::as_str).unwrap_or("")
        ));
        let param = if error == "access_denied" {
            ErrorPageParam::AccessDenied
        } else {
            ErrorPageParam::OAuthCallback
        };
        return error_redirect(ctx, param);
    }

    // Redirect-proxy hop: no state cookie on this host means we are the
    // proxy. The sealed state parameter carries the real callback target.
    if provider.use_redirect_proxy
        && !request_cookies.contains_key(&ctx.cookies.state.name)
    {
        if let Some(state_param) = query.get("state") {
            if let Ok(payload) = checks::state::decode_param(ctx, state_param) {
                if let Some(origin) = payload.origin {
                    return RouteOutcome::Redirect(format!("{origin}?{}", rebuild_query(query)));
                }
            }
        }
    }

    let (tokens, metadata) =
        match authenticate(ctx, provider, query, request_cookies, jar).await {
            Ok(pair) => pair,
            Err(e) => {
                ctx.logger
                    .error(&format!("callback for \"{}\" rejected: {e}", provider.id));
                let param = match e {
                    AuthError::Config(_) => ErrorPageParam::Configuration,
                    _ => ErrorPageParam::OAuthCallback,
                };
                return error_redirect(ctx, param);
            }
        };

    let raw_profile = match fetch_profile(ctx, provider, &tokens, &metadata, request_cookies, jar)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            ctx.logger
                .error(&format!("profile for \"{}\" unavailable: {e}", provider.id));
            return error_redirect(ctx, ErrorPageParam::OAuthCallback);
        }
    };

    let profile = match provider
        .profile
        .as_ref()
        .map(|mapper| mapper(&raw_profile))
        .unwrap_or_else(|| default_profile(&raw_profile))
    {
        Ok(profile) => profile,
        Err(e) => {
            ctx.logger
                .error(&format!("profile mapping for \"{}\" failed: {e}", provider.id));
            return error_redirect(ctx, ErrorPageParam::Callback);
        }
    };

    let account = AdapterAccount {
        user_id: String::new(),
        provider: provider.id.clone(),
        account_type: match provider.kind {
            OAuthKind::Oidc => "oidc".into(),
            OAuthKind::OAuth2 => "oauth".into(),
        },
        provider_account_id: profile.id.clone(),
        access_token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
        expires_at: tokens.expires_at,
        id_token: tokens.id_token.clone(),
        scope: tokens.scope.clone(),
        token_type: tokens.token_type.clone(),
        session_state: None,
    };

    let user = match resolve_user(ctx, provider, &profile, account).await {
        Ok(UserResolution::User(user)) => user,
        Ok(UserResolution::ExistingUnlinkedEmail) => {
            ctx.logger.warn(&format!(
                "account \"{}\" on \"{}\" matches an existing user by email but is not linked",
                profile.id, provider.id
            ));
            return error_redirect(ctx, ErrorPageParam::OAuthAccountNotLinked);
        }
        Err(e) => {
            ctx.logger
                .error(&format!("user resolution for \"{}\" failed: {e}", provider.id));
            return error_redirect(ctx, ErrorPageParam::Callback);
        }
    };

    if let Err(e) = session::create_session(ctx, request_cookies, jar, &user).await {
        ctx.logger
            .error(&format!("session creation after \"{}\" sign-in failed: {e}", provider.id));
        return error_redirect(ctx, ErrorPageParam::Callback);
    }

    RouteOutcome::Redirect(redirect_target.to_string())
}

/// Validate the anti-replay checks and run the token exchange. All errors
/// here short-circuit the flow before any identity is trusted.
async fn authenticate(
    ctx: &AuthContext,
    provider: &OAuthProvider,
    query: &HashMap<String, String>,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> Result<(TokenSet, ProviderMetadata)> {
    if provider.requires_check(crate::providers::Check::State) {
        let payload = checks::state::use_check(ctx, request_cookies, jar)?;
        let presented = query
            .get("state")
            .ok_or(AuthError::InvalidCheck("state"))?;
        let presented_value = if provider.use_redirect_proxy {
            checks::state::decode_param(ctx, presented)?.value
        } else {
            presented.clone()
        };
        if !constant_time_equal(payload.value.as_bytes(), presented_value.as_bytes()) {
            return Err(AuthError::InvalidCheck("state"));
        }
    }

    let code = query
        .get("code")
        .cloned()
        .ok_or_else(|| AuthError::Provider("callback has no authorization code".into()))?;

    let code_verifier = if provider.requires_check(crate::providers::Check::Pkce) {
        Some(checks::pkce::use_check(ctx, request_cookies, jar)?)
    } else {
        None
    };

    let metadata = oauth::resolve_metadata(ctx, provider).await?;
    let token_endpoint = metadata.token_endpoint.clone().ok_or_else(|| {
        AuthError::Config(format!("provider \"{}\" has no token endpoint", provider.id))
    })?;

    let redirect_uri = if provider.use_redirect_proxy {
        ctx.options
            .redirect_proxy_url
            .clone()
            .unwrap_or_else(|| ctx.provider_callback_url(&provider.id))
    } else {
        ctx.provider_callback_url(&provider.id)
    };

    let tokens = ctx
        .http
        .exchange_code(TokenRequest {
            token_endpoint,
            code,
            redirect_uri,
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            client_auth: provider.client_auth,
            code_verifier,
            client_private_key: provider.client_private_key.clone(),
            extra_params: provider.token.params.clone(),
        })
        .await?;

    Ok((tokens, metadata))
}

/// Obtain the raw profile: validated ID-token claims for OIDC (unless
/// disabled), the userinfo document otherwise. The nonce cookie is always
/// consumed when the provider requires the check.
async fn fetch_profile(
    ctx: &AuthContext,
    provider: &OAuthProvider,
    tokens: &TokenSet,
    metadata: &ProviderMetadata,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> Result<serde_json::Value> {
    let expected_nonce = if provider.requires_check(crate::providers::Check::Nonce) {
        Some(checks::nonce::use_check(ctx, request_cookies, jar)?)
    } else {
        None
    };

    if provider.kind == OAuthKind::Oidc && provider.use_id_token {
        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::Provider("token response has no ID token".into()))?;
        let claims = id_token::decode_claims(id_token)?;
        id_token::validate_claims(
            &claims,
            &provider.client_id,
            metadata.issuer.as_deref(),
            expected_nonce.as_deref(),
        )?;
        return Ok(claims);
    }

    let endpoint = metadata.userinfo_endpoint.clone().ok_or_else(|| {
        AuthError::Config(format!("provider \"{}\" has no userinfo endpoint", provider.id))
    })?;
    let access_token = tokens
        .access_token
        .as_deref()
        .ok_or_else(|| AuthError::Provider("token response has no access token".into()))?;
    ctx.http.fetch_userinfo(&endpoint, access_token).await
}

enum UserResolution {
    User(AdapterUser),
    /// A user with the profile's email exists but has no link to this
    /// provider: refusing prevents account takeover through an attacker-
    /// controlled provider account with a victim's address.
    ExistingUnlinkedEmail,
}

async fn resolve_user(
    ctx: &AuthContext,
    provider: &OAuthProvider,
    profile: &crate::providers::OAuthProfile,
    mut account: AdapterAccount,
) -> Result<UserResolution> {
    if !ctx.storage.is_configured() {
        // Stateless mode: the profile itself is the user.
        return Ok(UserResolution::User(AdapterUser {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            email_verified: None,
            image: profile.image.clone(),
        }));
    }

    if let Some(user) = ctx
        .store()
        .get_user_by_account(&provider.id, &profile.id)
        .await?
    {
        return Ok(UserResolution::User(user));
    }

    if let Some(ref email) = profile.email {
        if ctx.store().get_user_by_email(email).await?.is_some() {
            return Ok(UserResolution::ExistingUnlinkedEmail);
        }
    }

    let user = ctx
        .store()
        .create_user(AdapterUser {
            id: String::new(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            email_verified: None,
            image: profile.image.clone(),
        })
        .await?;

    account.user_id = user.id.clone();
    ctx.store().link_account(account).await?;

    Ok(UserResolution::User(user))
}

// ─── Email (magic link) ─────────────────────────────────────────

async fn email_callback(
    ctx: &AuthContext,
    provider: &EmailProvider,
    query: &HashMap<String, String>,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
    redirect_target: &str,
) -> RouteOutcome {
    let (Some(token), Some(email)) = (query.get("token"), query.get("email")) else {
        ctx.logger.debug("magic-link callback missing token or email");
        return error_redirect(ctx, ErrorPageParam::Verification);
    };

    let secret = ctx.secrets.first().map(String::as_str).unwrap_or_default();
    let hashed = hash_verification_token(token, secret);

    let verification = match ctx.store().use_verification_token(email, &hashed).await {
        Ok(v) => v,
        Err(e) => {
            ctx.logger
                .error(&format!("verification token lookup failed: {e}"));
            return error_redirect(ctx, ErrorPageParam::EmailSignin);
        }
    };

    // Absent means never issued or already consumed; both read the same.
    let Some(verification) = verification else {
        ctx.logger.debug("magic-link token not found or already used");
        return error_redirect(ctx, ErrorPageParam::Verification);
    };
    if verification.expires <= Utc::now() {
        ctx.logger.debug("magic-link token expired");
        return error_redirect(ctx, ErrorPageParam::Verification);
    }

    let user = match upsert_email_user(ctx, email).await {
        Ok(user) => user,
        Err(e) => {
            ctx.logger
                .error(&format!("magic-link user persistence failed: {e}"));
            return error_redirect(ctx, ErrorPageParam::EmailSignin);
        }
    };

    if let Err(e) = session::create_session(ctx, request_cookies, jar, &user).await {
        ctx.logger
            .error(&format!("session creation after \"{}\" sign-in failed: {e}", provider.id));
        return error_redirect(ctx, ErrorPageParam::EmailSignin);
    }

    RouteOutcome::Redirect(redirect_target.to_string())
}

async fn upsert_email_user(ctx: &AuthContext, email: &str) -> Result<AdapterUser> {
    match ctx.store().get_user_by_email(email).await? {
        Some(mut user) => {
            user.email_verified = Some(Utc::now());
            ctx.store().update_user(user).await
        }
        None => {
            ctx.store()
                .create_user(AdapterUser {
                    id: String::new(),
                    name: None,
                    email: Some(email.to_string()),
                    email_verified: Some(Utc::now()),
                    image: None,
                })
                .await
        }
    }
}

// ─── Credentials ────────────────────────────────────────────────

pub async fn credentials_callback(
    ctx: &AuthContext,
    provider: &CredentialsProvider,
    body: serde_json::Value,
    csrf_verified: bool,
    redirect_target: &str,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> RouteOutcome {
    if !csrf_verified {
        ctx.logger.warn("credentials sign-in blocked: request not verified");
        return error_redirect(ctx, ErrorPageParam::AccessDenied);
    }

    match (provider.authorize)(body).await {
        Ok(Some(user)) => {
            if let Err(e) = session::create_session(ctx, request_cookies, jar, &user).await {
                ctx.logger
                    .error(&format!("session creation after credentials sign-in failed: {e}"));
                return error_redirect(ctx, ErrorPageParam::Callback);
            }
            RouteOutcome::Redirect(redirect_target.to_string())
        }
        Ok(None) => {
            ctx.logger.debug("credentials rejected by authorize callback");
            error_redirect(ctx, ErrorPageParam::CredentialsSignin)
        }
        Err(e) => {
            ctx.logger.error(&format!("authorize callback failed: {e}"));
            error_redirect(ctx, ErrorPageParam::CredentialsSignin)
        }
    }
}

// ─── WebAuthn ───────────────────────────────────────────────────

async fn webauthn_callback(
    ctx: &AuthContext,
    provider: &WebAuthnProvider,
    body: serde_json::Value,
    csrf_verified: bool,
    redirect_target: &str,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> RouteOutcome {
    if !csrf_verified {
        ctx.logger.warn("webauthn sign-in blocked: request not verified");
        return error_redirect(ctx, ErrorPageParam::AccessDenied);
    }

    let challenge = match checks::challenge::use_check(ctx, request_cookies, jar) {
        Ok(value) => value,
        Err(e) => {
            ctx.logger.error(&format!("webauthn callback rejected: {e}"));
            return error_redirect(ctx, ErrorPageParam::Callback);
        }
    };

    match (provider.verify)(body, challenge).await {
        Ok(Some(user)) => {
            if let Err(e) = session::create_session(ctx, request_cookies, jar, &user).await {
                ctx.logger
                    .error(&format!("session creation after webauthn sign-in failed: {e}"));
                return error_redirect(ctx, ErrorPageParam::Callback);
            }
            RouteOutcome::Redirect(redirect_target.to_string())
        }
        Ok(None) => {
            ctx.logger.debug("webauthn assertion rejected");
            error_redirect(ctx, ErrorPageParam::AccessDenied)
        }
        Err(e) => {
            ctx.logger.error(&format!("webauthn verification failed: {e}"));
            error_redirect(ctx, ErrorPageParam::Callback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::test_support::{
        apply_jar, make_context, make_context_with, make_email_context, MockAdapter,
    };
    use crate::providers::Check;
    use std::sync::Arc;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn error_param(outcome: &RouteOutcome) -> Option<String> {
        match outcome {
            RouteOutcome::Redirect(url) => url
                .split_once("error=")
                .map(|(_, param)| param.to_string()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_mismatched_state_rejected_without_session() {
        let ctx = make_context(|_| {});
        let provider = ctx.oauth_provider("acme").unwrap().clone();

        // Start a flow to get a legitimate state cookie.
        let mut jar = CookieJar::new();
        checks::state::create(&ctx, &provider, &mut jar).unwrap();
        let mut cookies = HashMap::new();
        apply_jar(&mut cookies, &jar);

        let mut response_jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("code", "abc"), ("state", "attacker-state")]),
                ..Default::default()
            },
            &cookies,
            &mut response_jar,
        )
        .await;

        assert_eq!(error_param(&outcome).as_deref(), Some("OAuthCallback"));
        // No session cookie was written; the state cookie was cleared.
        assert!(response_jar.get(&ctx.cookies.session_token.name).is_none());
        assert_eq!(
            response_jar.get(&ctx.cookies.state.name).unwrap().max_age,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_missing_state_cookie_rejected() {
        let ctx = make_context(|_| {});
        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("code", "abc"), ("state", "whatever")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&outcome).as_deref(), Some("OAuthCallback"));
    }

    #[tokio::test]
    async fn test_provider_error_param_access_denied() {
        let ctx = make_context(|_| {});
        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("error", "access_denied")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&outcome).as_deref(), Some("AccessDenied"));
    }

    #[tokio::test]
    async fn test_provider_error_param_generic() {
        let ctx = make_context(|_| {});
        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("error", "temporarily_unavailable")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&outcome).as_deref(), Some("OAuthCallback"));
    }

    #[tokio::test]
    async fn test_state_check_skipped_when_excluded() {
        // Provider excludes every check: the callback proceeds to the
        // token exchange, which the test HTTP stub rejects.
        let ctx = make_context_with(
            |_| {},
            |provider| {
                provider.checks = vec![];
            },
        );
        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("code", "abc")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        // Fails at the exchange, not at the absent state.
        assert_eq!(error_param(&outcome).as_deref(), Some("OAuthCallback"));
    }

    #[tokio::test]
    async fn test_credentials_requires_verified_request() {
        let ctx = make_context(|_| {});
        let provider = CredentialsProvider::new(Arc::new(|_body| {
            Box::pin(async { Ok(None) })
        }));
        let mut jar = CookieJar::new();
        let outcome = credentials_callback(
            &ctx,
            &provider,
            serde_json::json!({}),
            false,
            "https://app.example.com",
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&outcome).as_deref(), Some("AccessDenied"));
    }

    #[tokio::test]
    async fn test_credentials_rejection_and_acceptance() {
        let ctx = make_context(|_| {});
        let provider = CredentialsProvider::new(Arc::new(|body: serde_json::Value| {
            Box::pin(async move {
                if body["password"] == "hunter2" {
                    Ok(Some(AdapterUser {
                        id: "user-1".into(),
                        name: Some("Jo".into()),
                        email: Some("jo@example.com".into()),
                        email_verified: None,
                        image: None,
                    }))
                } else {
                    Ok(None)
                }
            })
        }));

        let mut jar = CookieJar::new();
        let rejected = credentials_callback(
            &ctx,
            &provider,
            serde_json::json!({"password": "wrong"}),
            true,
            "https://app.example.com/done",
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&rejected).as_deref(), Some("CredentialsSignin"));
        assert!(jar.get(&ctx.cookies.session_token.name).is_none());

        let mut jar = CookieJar::new();
        let accepted = credentials_callback(
            &ctx,
            &provider,
            serde_json::json!({"password": "hunter2"}),
            true,
            "https://app.example.com/done",
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(
            accepted,
            RouteOutcome::Redirect("https://app.example.com/done".into())
        );
        assert!(jar.get(&ctx.cookies.session_token.name).is_some());
    }

    #[tokio::test]
    async fn test_email_callback_happy_path_and_single_use() {
        let adapter = Arc::new(MockAdapter::default());
        let (ctx, sent) = make_email_context(adapter.clone());

        // Issue a magic link.
        let mut jar = CookieJar::new();
        let outcome = crate::routes::sign_in::handle_sign_in(
            &ctx,
            "email",
            crate::routes::sign_in::SignInRequest {
                email: Some("jo@example.com".into()),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(
            outcome,
            RouteOutcome::Redirect("https://app.example.com/auth/verify-request".into())
        );

        let message = sent.lock().unwrap().pop().expect("email was sent");
        assert_eq!(message.identifier, "jo@example.com");

        // Consume it.
        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "email",
            CallbackRequest {
                query: query(&[("token", &message.token), ("email", "jo@example.com")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(
            outcome,
            RouteOutcome::Redirect("https://app.example.com".into())
        );
        assert!(jar.get(&ctx.cookies.session_token.name).is_some());

        // The user exists and is verified.
        let user = adapter.user_by_email("jo@example.com").await.unwrap();
        assert!(user.email_verified.is_some());

        // Replay fails.
        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "email",
            CallbackRequest {
                query: query(&[("token", &message.token), ("email", "jo@example.com")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&outcome).as_deref(), Some("Verification"));
        assert!(jar.get(&ctx.cookies.session_token.name).is_none());
    }

    #[tokio::test]
    async fn test_email_callback_bogus_token() {
        let adapter = Arc::new(MockAdapter::default());
        let (ctx, _sent) = make_email_context(adapter);

        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "email",
            CallbackRequest {
                query: query(&[("token", "forged"), ("email", "jo@example.com")]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut jar,
        )
        .await;
        assert_eq!(error_param(&outcome).as_deref(), Some("Verification"));
    }

    #[tokio::test]
    async fn test_callback_url_cookie_is_consumed_and_validated() {
        let ctx = make_context(|_| {});
        let mut cookies = HashMap::new();
        // Cookie-tossed, untrusted target must not be followed.
        cookies.insert(
            ctx.cookies.callback_url.name.clone(),
            "https://evil.example.org/".to_string(),
        );

        let mut jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("error", "access_denied")]),
                ..Default::default()
            },
            &cookies,
            &mut jar,
        )
        .await;
        // Error path: still cleans up the callback-url cookie.
        assert!(error_param(&outcome).is_some());
        assert_eq!(
            jar.get(&ctx.cookies.callback_url.name).unwrap().max_age,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_proxied_callback_forwards_to_origin() {
        let ctx = make_context_with(
            |options| {
                options.redirect_proxy_url =
                    Some("https://proxy.example.com/auth/callback".into());
            },
            |provider| {
                provider.use_redirect_proxy = true;
                provider.checks = vec![Check::State];
            },
        );
        let provider = ctx.oauth_provider("acme").unwrap().clone();

        // Sign-in issues a sealed state parameter carrying the origin.
        let mut jar = CookieJar::new();
        let param = checks::state::create(&ctx, &provider, &mut jar)
            .unwrap()
            .unwrap();

        // The proxy host has no state cookie: it must forward.
        let mut proxy_jar = CookieJar::new();
        let outcome = handle_callback(
            &ctx,
            "acme",
            CallbackRequest {
                query: query(&[("code", "abc"), ("state", &param)]),
                ..Default::default()
            },
            &HashMap::new(),
            &mut proxy_jar,
        )
        .await;

        let RouteOutcome::Redirect(url) = outcome else {
            panic!("expected a forward redirect");
        };
        assert!(url.starts_with("https://app.example.com/auth/callback/acme?"));
        assert!(url.contains("code=abc"));
        assert!(url.contains("state="));
    }
}

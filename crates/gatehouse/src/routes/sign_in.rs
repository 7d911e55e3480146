// Sign-in route: starts a flow for one provider.
//
// OAuth providers get an authorization redirect with the check cookies
// written; the email provider mints and sends a magic link; credentials
// and WebAuthn delegate to their callback logic.

use std::collections::HashMap;

use chrono::{TimeDelta, Utc};

use gatehouse_core::adapter::VerificationToken;
use gatehouse_core::error::{AuthError, Result};
use gatehouse_core::ErrorPageParam;

use crate::checks;
use crate::context::AuthContext;
use crate::cookies::CookieJar;
use crate::crypto::{generate_random_string, hash_verification_token};
use crate::oauth::{self, build_authorization_url, AuthorizationUrlParams};
use crate::providers::{EmailProvider, OAuthKind, OAuthProvider, Provider};
use crate::routes::{callback, error_redirect, RouteOutcome};

/// Everything the router extracted from the sign-in request.
#[derive(Debug, Default)]
pub struct SignInRequest {
    /// Requested post-auth redirect; validated against the trust rules.
    pub callback_url: Option<String>,
    /// Email address, for the email provider.
    pub email: Option<String>,
    /// Per-request authorization parameter overrides from the query.
    pub authorization_params: Vec<(String, String)>,
    /// The raw body, for credentials-style providers.
    pub body: serde_json::Value,
    /// Whether the CSRF guard verified this request.
    pub csrf_verified: bool,
}

pub async fn handle_sign_in(
    ctx: &AuthContext,
    provider_id: &str,
    request: SignInRequest,
    request_cookies: &HashMap<String, String>,
    jar: &mut CookieJar,
) -> RouteOutcome {
    let Some(provider) = ctx.provider(provider_id) else {
        ctx.logger
            .warn(&format!("sign-in requested for unknown provider \"{provider_id}\""));
        return error_redirect(ctx, ErrorPageParam::Signin);
    };
    let provider = provider.clone();

    // Remember where to land after the callback.
    let redirect_target = ctx.resolve_redirect(request.callback_url.as_deref());
    jar.set_cookie(&ctx.cookies.callback_url, &redirect_target);

    match provider {
        Provider::OAuth(oauth_provider) => {
            match oauth_sign_in(ctx, &oauth_provider, &request.authorization_params, jar).await {
                Ok(url) => RouteOutcome::Redirect(url),
                Err(e) => {
                    ctx.logger
                        .error(&format!("authorization request for \"{}\" failed: {e}", oauth_provider.id));
                    error_redirect(ctx, ErrorPageParam::OAuthSignin)
                }
            }
        }
        Provider::Email(email_provider) => {
            match email_sign_in(ctx, &email_provider, request.email.as_deref()).await {
                Ok(()) => RouteOutcome::Redirect(ctx.verify_request_url()),
                Err(e) => {
                    ctx.logger
                        .error(&format!("magic-link sign-in failed: {e}"));
                    error_redirect(ctx, ErrorPageParam::EmailSignin)
                }
            }
        }
        Provider::Credentials(credentials_provider) => {
            callback::credentials_callback(
                ctx,
                &credentials_provider,
                request.body,
                request.csrf_verified,
                &redirect_target,
                request_cookies,
                jar,
            )
            .await
        }
        Provider::WebAuthn(_) => match checks::challenge::create(ctx, jar) {
            Ok(challenge) => RouteOutcome::Json(serde_json::json!({ "challenge": challenge })),
            Err(e) => {
                ctx.logger.error(&format!("challenge creation failed: {e}"));
                error_redirect(ctx, ErrorPageParam::Signin)
            }
        },
    }
}

/// Stage 1 of the authorization-code flow: build the provider redirect.
async fn oauth_sign_in(
    ctx: &AuthContext,
    provider: &OAuthProvider,
    overrides: &[(String, String)],
    jar: &mut CookieJar,
) -> Result<String> {
    let metadata = oauth::resolve_metadata(ctx, provider).await?;
    let endpoint = metadata.authorization_endpoint.ok_or_else(|| {
        AuthError::Config(format!(
            "provider \"{}\" has no authorization endpoint",
            provider.id
        ))
    })?;

    let state = checks::state::create(ctx, provider, jar)?;
    let nonce = checks::nonce::create(ctx, provider, jar)?;
    let code_challenge = checks::pkce::create(ctx, provider, jar)?;

    let redirect_uri = if provider.use_redirect_proxy {
        ctx.options
            .redirect_proxy_url
            .clone()
            .unwrap_or_else(|| ctx.provider_callback_url(&provider.id))
    } else {
        ctx.provider_callback_url(&provider.id)
    };

    // Scope: request override, then provider config, then the protocol
    // default for the provider kind.
    let find_scope = |params: &[(String, String)]| {
        params
            .iter()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.clone())
    };
    let scope = find_scope(overrides)
        .or_else(|| find_scope(&provider.authorization.params))
        .or_else(|| match provider.kind {
            OAuthKind::Oidc => Some("openid profile email".to_string()),
            OAuthKind::OAuth2 => None,
        });

    let mut extra_params: Vec<(String, String)> = provider
        .authorization
        .params
        .iter()
        .filter(|(k, _)| k != "scope")
        .cloned()
        .collect();
    for (key, value) in overrides {
        if key == "scope" {
            continue;
        }
        extra_params.retain(|(k, _)| k != key);
        extra_params.push((key.clone(), value.clone()));
    }

    let url = build_authorization_url(AuthorizationUrlParams {
        endpoint,
        client_id: provider.client_id.clone(),
        redirect_uri,
        response_type: None,
        scope,
        state,
        nonce,
        code_challenge,
        extra_params,
    })?;

    Ok(url.to_string())
}

/// Mint a magic-link token, persist its hash, hand the link to the
/// caller's delivery callback.
async fn email_sign_in(
    ctx: &AuthContext,
    provider: &EmailProvider,
    email: Option<&str>,
) -> Result<()> {
    let email = email
        .filter(|e| e.contains('@'))
        .ok_or_else(|| AuthError::Other("sign-in request has no usable email address".into()))?;

    let token = generate_random_string(32);
    let secret = ctx.secrets.first().map(String::as_str).unwrap_or_default();
    let expires = Utc::now() + TimeDelta::seconds(provider.max_age as i64);

    ctx.store()
        .create_verification_token(VerificationToken {
            identifier: email.to_string(),
            token: hash_verification_token(&token, secret),
            expires,
        })
        .await?;

    let url = format!(
        "{}?token={}&email={}",
        ctx.action_url(&format!("/callback/{}", provider.id)),
        urlencoding::encode(&token),
        urlencoding::encode(email)
    );

    (provider.send_verification_request)(crate::providers::EmailMessage {
        identifier: email.to_string(),
        url,
        token,
        expires,
        provider_id: provider.id.clone(),
    })
    .await
}

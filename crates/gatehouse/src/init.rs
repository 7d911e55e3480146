// Configuration assertion and context construction.
//
// Every invariant that used to surface as a call-site surprise is checked
// here, once, before the first request: secrets present, URLs parsable,
// provider records complete, the session strategy compatible with both
// the storage capability and the provider set.

use std::collections::HashSet;
use std::sync::Arc;

use gatehouse_core::adapter::Storage;
use gatehouse_core::error::{AuthError, Result};
use gatehouse_core::logger::{AuthLogger, LogLevel, LoggerConfig};
use gatehouse_core::options::{AuthOptions, SessionStrategy};

use crate::context::{AuthContext, SessionConfig};
use crate::cookies;
use crate::oauth::{HttpOAuthClient, OAuthHttp};
use crate::providers::{OAuthKind, Provider};

/// Build the auth context with the production HTTP client.
pub fn init(
    options: AuthOptions,
    providers: Vec<Provider>,
    storage: Storage,
) -> Result<Arc<AuthContext>> {
    init_with_http(options, providers, storage, Arc::new(HttpOAuthClient::new()))
}

/// Build the auth context with an explicit HTTP implementation.
pub fn init_with_http(
    options: AuthOptions,
    providers: Vec<Provider>,
    storage: Storage,
    http: Arc<dyn OAuthHttp>,
) -> Result<Arc<AuthContext>> {
    if options.secret.is_empty() || options.secret.iter().any(String::is_empty) {
        return Err(AuthError::Config(
            "a non-empty secret must be configured".into(),
        ));
    }

    if let Some(ref base) = options.base_url {
        url::Url::parse(base)
            .map_err(|e| AuthError::Config(format!("base URL is not a valid URL: {e}")))?;
    }

    let mut seen_ids = HashSet::new();
    for provider in &providers {
        if !seen_ids.insert(provider.id().to_string()) {
            return Err(AuthError::Config(format!(
                "duplicate provider id \"{}\"",
                provider.id()
            )));
        }
    }

    let strategy = options.session.strategy.unwrap_or({
        if storage.full().is_some() {
            SessionStrategy::Database
        } else {
            SessionStrategy::Jwt
        }
    });

    if strategy == SessionStrategy::Database && storage.full().is_none() {
        return Err(AuthError::Config(
            "the database session strategy requires a full storage adapter".into(),
        ));
    }

    for provider in &providers {
        match provider {
            Provider::Credentials(_) if strategy == SessionStrategy::Database => {
                return Err(AuthError::Config(
                    "credentials providers require the jwt session strategy".into(),
                ));
            }
            Provider::Email(_) if storage.full().is_none() => {
                return Err(AuthError::Config(
                    "the email provider requires a full storage adapter".into(),
                ));
            }
            Provider::OAuth(oauth) => {
                if oauth.client_id.is_empty() {
                    return Err(AuthError::Config(format!(
                        "provider \"{}\" has no client id",
                        oauth.id
                    )));
                }
                let has_static_endpoints =
                    oauth.authorization.url.is_some() && oauth.token.url.is_some();
                if !has_static_endpoints && oauth.issuer.is_none() {
                    return Err(AuthError::Config(format!(
                        "provider \"{}\" needs an issuer or explicit authorization and token endpoints",
                        oauth.id
                    )));
                }
                let fetches_userinfo =
                    oauth.kind == OAuthKind::OAuth2 || !oauth.use_id_token;
                if fetches_userinfo && oauth.userinfo.url.is_none() && oauth.issuer.is_none() {
                    return Err(AuthError::Config(format!(
                        "provider \"{}\" needs a userinfo endpoint",
                        oauth.id
                    )));
                }
            }
            _ => {}
        }
    }

    let logger = AuthLogger::new(LoggerConfig {
        disabled: options.logger.disabled,
        disable_colors: false,
        level: LogLevel::from(options.logger.level.as_str()),
        custom_handler: options.logger.handler.clone(),
    });

    let auth_cookies = cookies::get_cookies(&options);
    let session_config = SessionConfig {
        strategy,
        max_age: options.session.max_age as i64,
        update_age: options.session.update_age as i64,
    };
    let secrets = options.secret.clone();
    let base_url = options
        .base_url
        .clone()
        .map(|u| u.trim_end_matches('/').to_string());
    let base_path = options.base_path.clone();

    Ok(Arc::new(AuthContext {
        options,
        secrets,
        base_url,
        base_path,
        cookies: auth_cookies,
        providers,
        session_config,
        storage,
        logger,
        http,
    }))
}

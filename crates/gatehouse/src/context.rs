// Auth context: the fully-initialized configuration for request
// processing, shared as `Arc<AuthContext>` across handlers. Built once by
// `init` after all configuration assertions pass.

use std::sync::Arc;

use gatehouse_core::adapter::Storage;
use gatehouse_core::logger::AuthLogger;
use gatehouse_core::options::{AuthOptions, SessionStrategy};
use gatehouse_core::ErrorPageParam;

use crate::cookies::AuthCookies;
use crate::oauth::OAuthHttp;
use crate::providers::{OAuthProvider, Provider};
use crate::storage::StorageOps;

/// Resolved session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub strategy: SessionStrategy,
    /// Session TTL in seconds.
    pub max_age: i64,
    /// Minimum interval between database expiry extensions, in seconds.
    pub update_age: i64,
}

pub struct AuthContext {
    pub options: AuthOptions,
    /// Rotation list, newest first.
    pub secrets: Vec<String>,
    pub base_url: Option<String>,
    pub base_path: String,
    pub cookies: AuthCookies,
    pub providers: Vec<Provider>,
    pub session_config: SessionConfig,
    pub storage: Storage,
    pub logger: AuthLogger,
    pub http: Arc<dyn OAuthHttp>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("secrets", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("base_path", &self.base_path)
            .field("providers", &self.providers)
            .field("session_config", &self.session_config)
            .field("storage", &self.storage)
            .finish()
    }
}

impl AuthContext {
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id() == id)
    }

    pub fn oauth_provider(&self, id: &str) -> Option<&OAuthProvider> {
        match self.provider(id) {
            Some(Provider::OAuth(p)) => Some(p),
            _ => None,
        }
    }

    /// Logged storage operations.
    pub fn store(&self) -> StorageOps<'_> {
        StorageOps {
            storage: &self.storage,
            logger: &self.logger,
        }
    }

    /// Absolute URL of an action path under the handler's base path.
    pub fn action_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.as_deref().unwrap_or(""),
            self.base_path,
            path
        )
    }

    /// Redirect URI registered with a provider.
    pub fn provider_callback_url(&self, provider_id: &str) -> String {
        self.action_url(&format!("/callback/{provider_id}"))
    }

    /// The origin of the base URL, e.g. "https://example.com".
    pub fn origin(&self) -> Option<String> {
        let base = self.base_url.as_deref()?;
        url::Url::parse(base)
            .ok()
            .map(|u| u.origin().ascii_serialization())
    }

    /// Error surface URL carrying the coarse error parameter.
    pub fn error_url(&self, error: ErrorPageParam) -> String {
        let base = self
            .options
            .pages
            .error
            .clone()
            .unwrap_or_else(|| self.action_url("/error"));
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}error={}", error.as_str())
    }

    /// "Check your email" surface URL.
    pub fn verify_request_url(&self) -> String {
        self.options
            .pages
            .verify_request
            .clone()
            .unwrap_or_else(|| self.action_url("/verify-request"))
    }

    /// Whether a redirect target is safe to send the browser to: relative
    /// paths, the base origin, or an explicitly trusted host.
    pub fn is_trusted_redirect(&self, target: &str) -> bool {
        if target.starts_with('/') && !target.starts_with("//") {
            return true;
        }
        let Ok(parsed) = url::Url::parse(target) else {
            return false;
        };
        if let Some(origin) = self.origin() {
            if parsed.origin().ascii_serialization() == origin {
                return true;
            }
        }
        parsed
            .host_str()
            .map(|host| self.options.trusted_hosts.iter().any(|h| h == host))
            .unwrap_or(false)
    }

    /// Resolve a requested redirect target against the trust rules,
    /// falling back to the base URL.
    pub fn resolve_redirect(&self, requested: Option<&str>) -> String {
        let fallback = || self.base_url.clone().unwrap_or_else(|| "/".to_string());

        match requested {
            Some(target) if self.is_trusted_redirect(target) => {
                if target.starts_with('/') {
                    match self.origin() {
                        Some(origin) => format!("{origin}{target}"),
                        None => target.to_string(),
                    }
                } else {
                    target.to_string()
                }
            }
            _ => fallback(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::test_support::make_context;

    #[test]
    fn test_action_urls() {
        let ctx = make_context(|_| {});
        assert_eq!(
            ctx.action_url("/csrf"),
            "https://app.example.com/auth/csrf"
        );
        assert_eq!(
            ctx.provider_callback_url("acme"),
            "https://app.example.com/auth/callback/acme"
        );
    }

    #[test]
    fn test_error_url_appends_param() {
        let ctx = make_context(|_| {});
        assert_eq!(
            ctx.error_url(ErrorPageParam::OAuthCallback),
            "https://app.example.com/auth/error?error=OAuthCallback"
        );
    }

    #[test]
    fn test_error_url_custom_page_with_query() {
        let ctx = make_context(|options| {
            options.pages.error = Some("https://app.example.com/oops?source=auth".into());
        });
        assert_eq!(
            ctx.error_url(ErrorPageParam::Callback),
            "https://app.example.com/oops?source=auth&error=Callback"
        );
    }

    #[test]
    fn test_redirect_trust() {
        let ctx = make_context(|options| {
            options.trusted_hosts.push("partner.example.net".into());
        });

        assert!(ctx.is_trusted_redirect("/dashboard"));
        assert!(ctx.is_trusted_redirect("https://app.example.com/anything"));
        assert!(ctx.is_trusted_redirect("https://partner.example.net/landing"));
        assert!(!ctx.is_trusted_redirect("https://evil.example.org/"));
        assert!(!ctx.is_trusted_redirect("//evil.example.org/"));
    }

    #[test]
    fn test_resolve_redirect() {
        let ctx = make_context(|_| {});
        assert_eq!(
            ctx.resolve_redirect(Some("/dashboard")),
            "https://app.example.com/dashboard"
        );
        assert_eq!(
            ctx.resolve_redirect(Some("https://evil.example.org/")),
            "https://app.example.com"
        );
        assert_eq!(ctx.resolve_redirect(None), "https://app.example.com");
    }
}

// AuthOptions: the explicit configuration passed into every entry point.
//
// There is no process-global state: secrets, URLs, session tuning, and the
// logger config all live here. Providers and the storage adapter are passed
// alongside the options at init time since they carry trait objects.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logger::LogHandler;

/// Top-level configuration for a gatehouse instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOptions {
    /// Signing/encryption secrets, newest first. Tokens are always sealed
    /// with the first entry; older entries remain valid for decoding until
    /// rotated out.
    pub secret: Vec<String>,

    /// Canonical public URL of the auth server (e.g. "https://example.com").
    /// Controls secure-cookie prefixes and redirect validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Path prefix for all auth routes (default: "/auth").
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Session lifecycle configuration.
    #[serde(default)]
    pub session: SessionOptions,

    /// Cookie naming and security configuration.
    #[serde(default)]
    pub cookies: CookieOptions,

    /// Hosts (origins) redirects may target besides the base URL.
    #[serde(default)]
    pub trusted_hosts: Vec<String>,

    /// When a provider requires a fixed redirect URI across deployments,
    /// callbacks bounce through this proxy URL and the state cookie carries
    /// the originating host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_proxy_url: Option<String>,

    /// Overrides for the built-in redirect surfaces.
    #[serde(default)]
    pub pages: PagesOptions,

    /// Logger configuration.
    #[serde(default)]
    pub logger: LoggerOptions,
}

fn default_base_path() -> String {
    "/auth".to_string()
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            secret: Vec::new(),
            base_url: None,
            base_path: default_base_path(),
            session: SessionOptions::default(),
            cookies: CookieOptions::default(),
            trusted_hosts: Vec::new(),
            redirect_proxy_url: None,
            pages: PagesOptions::default(),
            logger: LoggerOptions::default(),
        }
    }
}

impl AuthOptions {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: vec![secret.into()],
            ..Default::default()
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Push an older secret onto the rotation list.
    pub fn previous_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret.push(secret.into());
        self
    }

    pub fn session_strategy(mut self, strategy: SessionStrategy) -> Self {
        self.session.strategy = Some(strategy);
        self
    }

    pub fn trusted_host(mut self, host: impl Into<String>) -> Self {
        self.trusted_hosts.push(host.into());
        self
    }
}

// ─── Session Options ────────────────────────────────────────────

/// Which artifact carries the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStrategy {
    /// Self-contained sealed token in the cookie; no server-side record.
    Jwt,
    /// Opaque token in the cookie; authoritative record in storage.
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Explicit strategy override. When absent the strategy is chosen from
    /// the configured storage: `database` iff a full adapter is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SessionStrategy>,

    /// Session TTL in seconds (default: 2592000 = 30 days).
    #[serde(default = "default_session_max_age")]
    pub max_age: u64,

    /// Minimum interval between expiry extensions under the database
    /// strategy, in seconds (default: 86400 = 1 day). Throttles writes on
    /// read-heavy traffic.
    #[serde(default = "default_session_update_age")]
    pub update_age: u64,
}

fn default_session_max_age() -> u64 {
    2_592_000
}
fn default_session_update_age() -> u64 {
    86_400
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            strategy: None,
            max_age: default_session_max_age(),
            update_age: default_session_update_age(),
        }
    }
}

// ─── Cookie Options ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieOptions {
    /// Cookie name prefix (default: "gatehouse").
    #[serde(default = "default_cookie_prefix")]
    pub prefix: String,

    /// Force secure-cookie behavior on or off. When absent, secure mode is
    /// inferred from the base URL scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_secure: Option<bool>,
}

fn default_cookie_prefix() -> String {
    "gatehouse".to_string()
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            prefix: default_cookie_prefix(),
            use_secure: None,
        }
    }
}

// ─── Pages Options ──────────────────────────────────────────────

/// Redirect targets for the browser-facing surfaces. The handler never
/// renders HTML; callers point these at their own pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagesOptions {
    /// Error surface URL (default: "{basePath}/error").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Sign-in page URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign_in: Option<String>,

    /// "Check your email" page URL (default: "{basePath}/verify-request").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_request: Option<String>,
}

// ─── Logger Options ─────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerOptions {
    /// Disable logging entirely.
    #[serde(default)]
    pub disabled: bool,

    /// Minimum level: "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Custom log backend; the default writes to stdout/stderr.
    #[serde(skip)]
    pub handler: Option<Arc<dyn LogHandler>>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl fmt::Debug for LoggerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("disabled", &self.disabled)
            .field("level", &self.level)
            .field("handler", &self.handler.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            disabled: false,
            level: default_log_level(),
            handler: None,
        }
    }
}

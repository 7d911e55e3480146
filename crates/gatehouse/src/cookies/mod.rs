// Cookie management.
//
// Defines the fixed set of auth cookies, their per-purpose security
// attributes, cookie header parsing/serialization, and the ordered jar of
// Set-Cookie values a single request produces.

pub mod chunks;

use std::collections::HashMap;
use std::fmt;

use gatehouse_core::options::AuthOptions;

/// Prefix applied to most cookies when the transport is HTTPS.
pub const SECURE_COOKIE_PREFIX: &str = "__Secure-";
/// Stricter prefix used for the CSRF cookie under HTTPS: host-locked,
/// path "/", no Domain attribute.
pub const HOST_COOKIE_PREFIX: &str = "__Host-";

/// Lifetime of one-time check cookies (state, nonce, pkce, challenge).
pub const CHECK_COOKIE_MAX_AGE: i64 = 15 * 60;

/// SameSite attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// Attributes of a single Set-Cookie entry.
#[derive(Debug, Clone)]
pub struct CookieAttributes {
    pub value: String,
    pub max_age: Option<i64>,
    pub expires: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

/// A cookie definition: resolved name plus default attributes.
#[derive(Debug, Clone)]
pub struct AuthCookie {
    pub name: String,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub http_only: bool,
    pub max_age: Option<i64>,
}

impl AuthCookie {
    /// Attributes carrying a specific value with this cookie's defaults.
    pub fn to_attributes(&self, value: &str) -> CookieAttributes {
        CookieAttributes {
            value: value.to_string(),
            max_age: self.max_age,
            expires: None,
            domain: None,
            path: Some(self.path.clone()),
            secure: self.secure,
            http_only: self.http_only,
            same_site: Some(self.same_site),
        }
    }

    /// Deletion attributes: empty value, Max-Age=0.
    pub fn deletion(&self) -> CookieAttributes {
        CookieAttributes {
            value: String::new(),
            max_age: Some(0),
            expires: None,
            domain: None,
            path: Some(self.path.clone()),
            secure: self.secure,
            http_only: self.http_only,
            same_site: Some(self.same_site),
        }
    }
}

/// The fixed set of cookies the handler reads and writes.
#[derive(Debug, Clone)]
pub struct AuthCookies {
    pub session_token: AuthCookie,
    pub callback_url: AuthCookie,
    pub csrf_token: AuthCookie,
    pub pkce_code_verifier: AuthCookie,
    pub state: AuthCookie,
    pub nonce: AuthCookie,
    pub webauthn_challenge: AuthCookie,
}

fn make_cookie(base: &str, prefix: &str, secure: bool, max_age: Option<i64>) -> AuthCookie {
    let secure_prefix = if secure { SECURE_COOKIE_PREFIX } else { "" };
    AuthCookie {
        name: format!("{}{}.{}", secure_prefix, prefix, base),
        secure,
        same_site: SameSite::Lax,
        path: "/".to_string(),
        http_only: true,
        max_age,
    }
}

/// Build the cookie set from options.
///
/// Secure mode comes from `cookies.useSecure` when set, otherwise from the
/// base URL scheme. The CSRF cookie gets the `__Host-` prefix under HTTPS
/// so it cannot be planted from a subdomain.
pub fn get_cookies(options: &AuthOptions) -> AuthCookies {
    let secure = options.cookies.use_secure.unwrap_or_else(|| {
        options
            .base_url
            .as_deref()
            .map(|u| u.starts_with("https://"))
            .unwrap_or(false)
    });

    let prefix = options.cookies.prefix.as_str();
    let session_max_age = options.session.max_age as i64;

    let csrf_prefix = if secure { HOST_COOKIE_PREFIX } else { "" };
    let csrf_token = AuthCookie {
        name: format!("{}{}.csrf-token", csrf_prefix, prefix),
        secure,
        same_site: SameSite::Lax,
        path: "/".to_string(),
        http_only: true,
        max_age: None,
    };

    AuthCookies {
        session_token: make_cookie("session-token", prefix, secure, Some(session_max_age)),
        callback_url: make_cookie("callback-url", prefix, secure, None),
        csrf_token,
        pkce_code_verifier: make_cookie(
            "pkce.code_verifier",
            prefix,
            secure,
            Some(CHECK_COOKIE_MAX_AGE),
        ),
        state: make_cookie("state", prefix, secure, Some(CHECK_COOKIE_MAX_AGE)),
        nonce: make_cookie("nonce", prefix, secure, Some(CHECK_COOKIE_MAX_AGE)),
        webauthn_challenge: make_cookie("challenge", prefix, secure, Some(CHECK_COOKIE_MAX_AGE)),
    }
}

/// Parse a `Cookie` header into a name → value map.
pub fn parse_cookies(cookie_header: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for cookie in cookie_header.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=') {
            map.insert(name.to_string(), value.to_string());
        }
    }
    map
}

/// Serialize cookie attributes into a `Set-Cookie` header value.
pub fn serialize_cookie(name: &str, attrs: &CookieAttributes) -> String {
    let mut parts = vec![format!("{}={}", name, attrs.value)];

    if let Some(max_age) = attrs.max_age {
        parts.push(format!("Max-Age={}", max_age));
    }
    if let Some(ref expires) = attrs.expires {
        parts.push(format!("Expires={}", expires));
    }
    if let Some(ref domain) = attrs.domain {
        parts.push(format!("Domain={}", domain));
    }
    if let Some(ref path) = attrs.path {
        parts.push(format!("Path={}", path));
    }
    if attrs.secure {
        parts.push("Secure".into());
    }
    if attrs.http_only {
        parts.push("HttpOnly".into());
    }
    if let Some(same_site) = attrs.same_site {
        parts.push(format!("SameSite={}", same_site));
    }

    parts.join("; ")
}

// ─── Cookie Jar ─────────────────────────────────────────────────

/// Ordered sequence of cookies produced while processing one request.
///
/// Appended to the response unconditionally, including error paths, so
/// that cleanup entries (expired checks, invalid sessions) always reach
/// the browser. Setting the same name twice keeps the last entry.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    entries: Vec<(String, CookieAttributes)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cookie, replacing any earlier entry with the same name.
    pub fn set(&mut self, name: &str, attrs: CookieAttributes) {
        self.entries.retain(|(n, _)| n != name);
        self.entries.push((name.to_string(), attrs));
    }

    /// Set an auth cookie to a value using its default attributes.
    pub fn set_cookie(&mut self, cookie: &AuthCookie, value: &str) {
        self.set(&cookie.name, cookie.to_attributes(value));
    }

    /// Schedule deletion of an auth cookie.
    pub fn delete(&mut self, cookie: &AuthCookie) {
        self.set(&cookie.name, cookie.deletion());
    }

    /// Schedule deletion of an arbitrary name using another cookie's
    /// attributes as the template (chunk cleanup).
    pub fn delete_name(&mut self, name: &str, template: &AuthCookie) {
        self.set(name, template.deletion());
    }

    pub fn get(&self, name: &str) -> Option<&CookieAttributes> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, attrs)| attrs)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Serialized `Set-Cookie` header values, in insertion order.
    pub fn headers(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, attrs)| serialize_cookie(name, attrs))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, CookieAttributes)> {
        self.entries.iter()
    }
}

// Provider configuration.
//
// Every provider is one variant of a tagged enum, normalized at init into
// the exact record the flow driver consumes. Caller-supplied behavior
// (profile mapping, credential authorization, email delivery, WebAuthn
// attestation verification) comes in as Arc'd async closures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gatehouse_core::adapter::AdapterUser;
use gatehouse_core::error::Result;

// ─── Callback types ─────────────────────────────────────────────

/// Maps a raw provider profile (ID-token claims or userinfo body) into the
/// normalized profile.
pub type ProfileMapper =
    Arc<dyn Fn(&serde_json::Value) -> Result<OAuthProfile> + Send + Sync>;

/// Credentials authorization: request body in, authenticated user out.
/// `None` means the credentials were rejected.
pub type AuthorizeFn = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<Option<AdapterUser>>> + Send>>
        + Send
        + Sync,
>;

/// Magic-link delivery callback. The implementation dispatches the email;
/// gatehouse only mints and stores the token.
pub type SendVerificationRequest = Arc<
    dyn Fn(EmailMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

/// WebAuthn assertion verification: request body plus the round-tripped
/// challenge in, authenticated user out.
pub type VerifyAssertionFn = Arc<
    dyn Fn(serde_json::Value, String) -> Pin<Box<dyn Future<Output = Result<Option<AdapterUser>>> + Send>>
        + Send
        + Sync,
>;

/// Payload handed to the magic-link delivery callback.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// The address being signed in.
    pub identifier: String,
    /// The full callback URL embedding the raw token.
    pub url: String,
    /// The raw token (the stored copy is hashed).
    pub token: String,
    pub expires: DateTime<Utc>,
    pub provider_id: String,
}

/// Normalized profile produced by an OAuth sign-in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OAuthProfile {
    /// The stable account id at the provider.
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

// ─── Provider enum ──────────────────────────────────────────────

#[derive(Clone)]
pub enum Provider {
    OAuth(OAuthProvider),
    Email(EmailProvider),
    Credentials(CredentialsProvider),
    WebAuthn(WebAuthnProvider),
}

impl Provider {
    pub fn id(&self) -> &str {
        match self {
            Provider::OAuth(p) => &p.id,
            Provider::Email(p) => &p.id,
            Provider::Credentials(p) => &p.id,
            Provider::WebAuthn(p) => &p.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Provider::OAuth(p) => &p.name,
            Provider::Email(p) => &p.name,
            Provider::Credentials(p) => &p.name,
            Provider::WebAuthn(p) => &p.name,
        }
    }

    /// Account type string stored on linked accounts and reported by the
    /// providers listing.
    pub fn type_name(&self) -> &'static str {
        match self {
            Provider::OAuth(p) => match p.kind {
                OAuthKind::Oidc => "oidc",
                OAuthKind::OAuth2 => "oauth",
            },
            Provider::Email(_) => "email",
            Provider::Credentials(_) => "credentials",
            Provider::WebAuthn(_) => "webauthn",
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id())
            .field("type", &self.type_name())
            .finish()
    }
}

// ─── OAuth / OIDC ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthKind {
    Oidc,
    OAuth2,
}

/// Anti-replay checks a provider participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Pkce,
    State,
    Nonce,
}

/// Client authentication at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthMethod {
    /// RFC 7617 Basic credentials (default).
    #[default]
    ClientSecretBasic,
    /// client_id/client_secret in the form body.
    ClientSecretPost,
    /// HS256 assertion signed with the client secret.
    ClientSecretJwt,
    /// RS256 assertion signed with `client_private_key`.
    PrivateKeyJwt,
}

/// An endpoint URL plus static request parameters.
#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    pub url: Option<String>,
    pub params: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct OAuthProvider {
    pub id: String,
    pub name: String,
    pub kind: OAuthKind,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Issuer for `.well-known` discovery; endpoints below take priority.
    pub issuer: Option<String>,
    pub authorization: EndpointConfig,
    pub token: EndpointConfig,
    pub userinfo: EndpointConfig,
    /// Which checks are mandatory for this provider.
    pub checks: Vec<Check>,
    pub client_auth: ClientAuthMethod,
    /// PEM-encoded RSA key for `PrivateKeyJwt`.
    pub client_private_key: Option<String>,
    /// For OIDC: trust validated ID-token claims as the profile. When
    /// false, userinfo is fetched instead. Ignored for plain OAuth2.
    pub use_id_token: bool,
    /// Custom profile mapping; standard OIDC claims are used when absent.
    pub profile: Option<ProfileMapper>,
    /// Route callbacks through the configured redirect proxy.
    pub use_redirect_proxy: bool,
}

impl OAuthProvider {
    /// An OIDC provider with discovery and the default checks.
    pub fn oidc(id: impl Into<String>, name: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: OAuthKind::Oidc,
            client_id: String::new(),
            client_secret: None,
            issuer: Some(issuer.into()),
            authorization: EndpointConfig::default(),
            token: EndpointConfig::default(),
            userinfo: EndpointConfig::default(),
            checks: vec![Check::Pkce, Check::State, Check::Nonce],
            client_auth: ClientAuthMethod::default(),
            client_private_key: None,
            use_id_token: true,
            profile: None,
            use_redirect_proxy: false,
        }
    }

    /// A plain OAuth2 provider with explicit endpoints.
    pub fn oauth2(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: OAuthKind::OAuth2,
            client_id: String::new(),
            client_secret: None,
            issuer: None,
            authorization: EndpointConfig::default(),
            token: EndpointConfig::default(),
            userinfo: EndpointConfig::default(),
            checks: vec![Check::Pkce, Check::State],
            client_auth: ClientAuthMethod::default(),
            client_private_key: None,
            use_id_token: false,
            profile: None,
            use_redirect_proxy: false,
        }
    }

    pub fn client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization.url = Some(url.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token.url = Some(url.into());
        self
    }

    pub fn userinfo_url(mut self, url: impl Into<String>) -> Self {
        self.userinfo.url = Some(url.into());
        self
    }

    pub fn authorization_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.authorization.params.push((key.into(), value.into()));
        self
    }

    pub fn checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    pub fn client_auth(mut self, method: ClientAuthMethod) -> Self {
        self.client_auth = method;
        self
    }

    pub fn profile(mut self, mapper: ProfileMapper) -> Self {
        self.profile = Some(mapper);
        self
    }

    pub fn requires_check(&self, check: Check) -> bool {
        self.checks.contains(&check)
    }
}

impl fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("issuer", &self.issuer)
            .field("checks", &self.checks)
            .field("client_auth", &self.client_auth)
            .field("profile", &self.profile.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Default profile mapping from standard OIDC claims.
pub fn default_profile(raw: &serde_json::Value) -> Result<OAuthProfile> {
    let id = raw["sub"]
        .as_str()
        .or_else(|| raw["id"].as_str())
        .map(str::to_string)
        .or_else(|| raw["id"].as_i64().map(|n| n.to_string()))
        .ok_or_else(|| {
            gatehouse_core::AuthError::Provider("profile is missing a subject identifier".into())
        })?;

    Ok(OAuthProfile {
        id,
        name: raw["name"].as_str().map(str::to_string),
        email: raw["email"].as_str().map(str::to_string),
        image: raw["picture"]
            .as_str()
            .or_else(|| raw["avatar_url"].as_str())
            .map(str::to_string),
    })
}

// ─── Email (magic link) ─────────────────────────────────────────

#[derive(Clone)]
pub struct EmailProvider {
    pub id: String,
    pub name: String,
    /// Token lifetime in seconds (default: 86400 = 24 hours).
    pub max_age: u64,
    pub send_verification_request: SendVerificationRequest,
}

impl EmailProvider {
    pub fn new(send: SendVerificationRequest) -> Self {
        Self {
            id: "email".into(),
            name: "Email".into(),
            max_age: 86_400,
            send_verification_request: send,
        }
    }
}

impl fmt::Debug for EmailProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailProvider")
            .field("id", &self.id)
            .field("max_age", &self.max_age)
            .field("send_verification_request", &"<callback>")
            .finish()
    }
}

// ─── Credentials ────────────────────────────────────────────────

#[derive(Clone)]
pub struct CredentialsProvider {
    pub id: String,
    pub name: String,
    pub authorize: AuthorizeFn,
}

impl CredentialsProvider {
    pub fn new(authorize: AuthorizeFn) -> Self {
        Self {
            id: "credentials".into(),
            name: "Credentials".into(),
            authorize,
        }
    }
}

impl fmt::Debug for CredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsProvider")
            .field("id", &self.id)
            .field("authorize", &"<callback>")
            .finish()
    }
}

// ─── WebAuthn ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct WebAuthnProvider {
    pub id: String,
    pub name: String,
    pub relying_party_id: Option<String>,
    pub relying_party_name: Option<String>,
    /// Verifies the client's assertion against the challenge; the actual
    /// attestation cryptography lives with the caller.
    pub verify: VerifyAssertionFn,
}

impl WebAuthnProvider {
    pub fn new(verify: VerifyAssertionFn) -> Self {
        Self {
            id: "webauthn".into(),
            name: "WebAuthn".into(),
            relying_party_id: None,
            relying_party_name: None,
            verify,
        }
    }
}

impl fmt::Debug for WebAuthnProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebAuthnProvider")
            .field("id", &self.id)
            .field("relying_party_id", &self.relying_party_id)
            .field("verify", &"<callback>")
            .finish()
    }
}

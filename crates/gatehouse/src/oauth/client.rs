// HTTP client seam for the authorization-code flow.
//
// Discovery, the code exchange, and userinfo are the only network calls in
// the whole handler. They sit behind `OAuthHttp` so the flow driver stays
// testable without a network; `HttpOAuthClient` is the production
// implementation. Timeouts are bounded and nothing retries: authorization
// codes and PKCE verifiers are single-use, so a retry would replay
// already-consumed material.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use gatehouse_core::error::{AuthError, Result};

use crate::providers::ClientAuthMethod;
use crate::oauth::tokens::TokenSet;

/// Authorization server metadata, from static config or discovery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
}

/// Everything needed for one code exchange.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub token_endpoint: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_auth: ClientAuthMethod,
    pub code_verifier: Option<String>,
    /// PEM RSA key for `PrivateKeyJwt`.
    pub client_private_key: Option<String>,
    /// Extra form parameters from provider config.
    pub extra_params: Vec<(String, String)>,
}

/// The outbound HTTP surface of the flow driver.
#[async_trait]
pub trait OAuthHttp: Send + Sync {
    /// Fetch `{issuer}/.well-known/openid-configuration`.
    async fn discover(&self, issuer: &str) -> Result<ProviderMetadata>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, request: TokenRequest) -> Result<TokenSet>;

    /// Fetch the userinfo document with a bearer token.
    async fn fetch_userinfo(&self, endpoint: &str, access_token: &str)
        -> Result<serde_json::Value>;
}

/// Production implementation over reqwest.
#[derive(Debug, Clone)]
pub struct HttpOAuthClient {
    client: reqwest::Client,
}

impl HttpOAuthClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Claims of a client authentication assertion (RFC 7523).
#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Build the signed client assertion for JWT-based client authentication.
fn client_assertion(request: &TokenRequest) -> Result<String> {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: request.client_id.clone(),
        sub: request.client_id.clone(),
        aud: request.token_endpoint.clone(),
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now,
        exp: now + 300,
    };

    let (header, key) = match request.client_auth {
        ClientAuthMethod::ClientSecretJwt => {
            let secret = request.client_secret.as_deref().ok_or_else(|| {
                AuthError::Config("client_secret_jwt requires a client secret".into())
            })?;
            (
                Header::new(Algorithm::HS256),
                EncodingKey::from_secret(secret.as_bytes()),
            )
        }
        ClientAuthMethod::PrivateKeyJwt => {
            let pem = request.client_private_key.as_deref().ok_or_else(|| {
                AuthError::Config("private_key_jwt requires a client private key".into())
            })?;
            let key = EncodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::Config(format!("invalid client private key: {e}")))?;
            (Header::new(Algorithm::RS256), key)
        }
        _ => unreachable!("assertion only built for JWT auth methods"),
    };

    encode(&header, &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("client assertion signing failed: {e}")))
}

const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

#[async_trait]
impl OAuthHttp for HttpOAuthClient {
    async fn discover(&self, issuer: &str) -> Result<ProviderMetadata> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("discovery request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "discovery returned {}",
                response.status()
            )));
        }

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| AuthError::Provider(format!("discovery document is malformed: {e}")))
    }

    async fn exchange_code(&self, request: TokenRequest) -> Result<TokenSet> {
        let mut form: Vec<(String, String)> = vec![
            ("grant_type".into(), "authorization_code".into()),
            ("code".into(), request.code.clone()),
            ("redirect_uri".into(), request.redirect_uri.clone()),
        ];

        if let Some(ref verifier) = request.code_verifier {
            form.push(("code_verifier".into(), verifier.clone()));
        }

        let mut http_request = self
            .client
            .post(&request.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json");

        match request.client_auth {
            ClientAuthMethod::ClientSecretBasic => {
                let credentials = format!(
                    "{}:{}",
                    request.client_id,
                    request.client_secret.as_deref().unwrap_or("")
                );
                let encoded = STANDARD.encode(credentials.as_bytes());
                http_request = http_request
                    .header(reqwest::header::AUTHORIZATION, format!("Basic {encoded}"));
            }
            ClientAuthMethod::ClientSecretPost => {
                form.push(("client_id".into(), request.client_id.clone()));
                if let Some(ref secret) = request.client_secret {
                    form.push(("client_secret".into(), secret.clone()));
                }
            }
            ClientAuthMethod::ClientSecretJwt | ClientAuthMethod::PrivateKeyJwt => {
                let assertion = client_assertion(&request)?;
                form.push(("client_id".into(), request.client_id.clone()));
                form.push(("client_assertion_type".into(), ASSERTION_TYPE.into()));
                form.push(("client_assertion".into(), assertion));
            }
        }

        for (key, value) in &request.extra_params {
            if !form.iter().any(|(k, _)| k == key) {
                form.push((key.clone(), value.clone()));
            }
        }

        let response = http_request
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("token response is malformed: {e}")))?;

        Ok(TokenSet::from_raw(raw))
    }

    async fn fetch_userinfo(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("userinfo response is malformed: {e}")))
    }
}

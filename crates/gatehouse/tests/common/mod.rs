// Shared scaffolding for the end-to-end scenarios: an in-memory storage
// adapter, a scripted OAuth HTTP stub, and a minimal "browser" that
// carries cookies between requests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use gatehouse::oauth::{OAuthHttp, ProviderMetadata, TokenRequest, TokenSet};
use gatehouse::providers::{OAuthProvider, Provider};
use gatehouse::{
    AdapterAccount, AdapterSession, AdapterUser, AuthContext, AuthError, AuthOptions,
    FullAdapter, GenericRequest, GenericResponse, PartialAdapter, Storage, VerificationToken,
};

pub const BASE_URL: &str = "https://app.example.com";

pub fn test_provider() -> OAuthProvider {
    OAuthProvider::oidc("acme", "Acme", "https://id.example.com")
        .client("acme-client-id", "acme-client-secret")
        .authorization_url("https://id.example.com/authorize")
        .token_url("https://id.example.com/token")
        .userinfo_url("https://id.example.com/userinfo")
}

pub fn build_context(storage: Storage, http: Arc<dyn OAuthHttp>) -> Arc<AuthContext> {
    gatehouse::init::init_with_http(
        AuthOptions::new("integration-secret-0123456789abcdef").base_url(BASE_URL),
        vec![Provider::OAuth(test_provider())],
        storage,
        http,
    )
    .expect("context must initialize")
}

// ─── Browser simulation ─────────────────────────────────────────

pub fn request(
    method: &str,
    path: &str,
    cookies: &HashMap<String, String>,
    body: Option<&str>,
) -> GenericRequest {
    let (path, query) = match path.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (path.to_string(), None),
    };

    let mut headers = HashMap::new();
    if !cookies.is_empty() {
        let header = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert("cookie".to_string(), header);
    }
    if body.is_some() {
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
    }

    GenericRequest {
        method: method.to_string(),
        path,
        query,
        headers,
        body: body.map(|b| b.as_bytes().to_vec()),
    }
}

/// Fold the response's Set-Cookie headers into the browser's cookie map.
pub fn accept_cookies(cookies: &mut HashMap<String, String>, response: &GenericResponse) {
    for header in response
        .headers
        .get("set-cookie")
        .cloned()
        .unwrap_or_default()
    {
        let Some((name, value)) = header.split(';').next().and_then(|nv| nv.split_once('='))
        else {
            continue;
        };
        if header.contains("Max-Age=0") {
            cookies.remove(name);
        } else {
            cookies.insert(name.to_string(), value.to_string());
        }
    }
}

pub fn set_cookie_names(response: &GenericResponse) -> Vec<String> {
    response
        .headers
        .get("set-cookie")
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|header| {
            header
                .split(';')
                .next()
                .and_then(|nv| nv.split_once('='))
                .map(|(name, _)| name.to_string())
        })
        .collect()
}

pub fn query_params(url: &str) -> HashMap<String, String> {
    let parsed = url::Url::parse(url).expect("redirect target must be a URL");
    parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

// ─── Scripted OAuth server ──────────────────────────────────────

#[derive(Default)]
pub struct StubOAuthHttp {
    /// Claims for the ID token in the next token response.
    id_claims: Mutex<serde_json::Value>,
    /// Userinfo document returned on request.
    userinfo: Mutex<serde_json::Value>,
    /// The last code exchange the handler performed.
    pub last_token_request: Mutex<Option<TokenRequest>>,
}

impl StubOAuthHttp {
    pub fn set_id_claims(&self, claims: serde_json::Value) {
        *self.id_claims.lock().unwrap() = claims;
    }

    pub fn set_userinfo(&self, doc: serde_json::Value) {
        *self.userinfo.lock().unwrap() = doc;
    }

    fn make_id_token(&self) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload =
            URL_SAFE_NO_PAD.encode(self.id_claims.lock().unwrap().to_string().as_bytes());
        format!("{header}.{payload}.stub-signature")
    }
}

#[async_trait]
impl OAuthHttp for StubOAuthHttp {
    async fn discover(&self, _issuer: &str) -> gatehouse::Result<ProviderMetadata> {
        Err(AuthError::Provider(
            "discovery not scripted for this test".into(),
        ))
    }

    async fn exchange_code(&self, request: TokenRequest) -> gatehouse::Result<TokenSet> {
        let id_token = self.make_id_token();
        *self.last_token_request.lock().unwrap() = Some(request);
        Ok(TokenSet::from_raw(serde_json::json!({
            "access_token": "stub-access-token",
            "token_type": "bearer",
            "expires_in": 3600,
            "id_token": id_token,
        })))
    }

    async fn fetch_userinfo(
        &self,
        _endpoint: &str,
        _access_token: &str,
    ) -> gatehouse::Result<serde_json::Value> {
        Ok(self.userinfo.lock().unwrap().clone())
    }
}

// ─── In-memory adapter ──────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    users: Vec<AdapterUser>,
    accounts: Vec<AdapterAccount>,
    sessions: HashMap<String, AdapterSession>,
    tokens: Vec<VerificationToken>,
    next_id: usize,
}

#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub async fn seed_user(&self, user: AdapterUser) -> AdapterUser {
        self.create_user(user).await.unwrap()
    }

    pub async fn seed_session(&self, session: AdapterSession) {
        let mut state = self.state.lock().unwrap();
        state
            .sessions
            .insert(session.session_token.clone(), session);
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().unwrap().accounts.len()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }
}

type AdapterResult<T> = gatehouse::AdapterResult<T>;

#[async_trait]
impl PartialAdapter for MemoryAdapter {
    async fn create_user(&self, mut user: AdapterUser) -> AdapterResult<AdapterUser> {
        let mut state = self.state.lock().unwrap();
        if user.id.is_empty() {
            state.next_id += 1;
            user.id = format!("user-{}", state.next_id);
        }
        state.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> AdapterResult<Option<AdapterUser>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AdapterResult<Option<AdapterUser>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AdapterResult<Option<AdapterUser>> {
        let state = self.state.lock().unwrap();
        let user_id = state
            .accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .map(|a| a.user_id.clone());
        Ok(user_id.and_then(|id| state.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn update_user(&self, user: AdapterUser) -> AdapterResult<AdapterUser> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.users.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        }
        Ok(user)
    }

    async fn link_account(&self, account: AdapterAccount) -> AdapterResult<()> {
        self.state.lock().unwrap().accounts.push(account);
        Ok(())
    }
}

#[async_trait]
impl FullAdapter for MemoryAdapter {
    async fn create_session(&self, session: AdapterSession) -> AdapterResult<AdapterSession> {
        let mut state = self.state.lock().unwrap();
        state
            .sessions
            .insert(session.session_token.clone(), session.clone());
        Ok(session)
    }

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> AdapterResult<Option<(AdapterSession, AdapterUser)>> {
        let state = self.state.lock().unwrap();
        let Some(session) = state.sessions.get(session_token).cloned() else {
            return Ok(None);
        };
        let user = state.users.iter().find(|u| u.id == session.user_id).cloned();
        Ok(user.map(|u| (session, u)))
    }

    async fn update_session(
        &self,
        session_token: &str,
        expires: DateTime<Utc>,
    ) -> AdapterResult<Option<AdapterSession>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.sessions.get_mut(session_token).map(|session| {
            session.expires = expires;
            session.clone()
        }))
    }

    async fn delete_session(&self, session_token: &str) -> AdapterResult<()> {
        self.state.lock().unwrap().sessions.remove(session_token);
        Ok(())
    }

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> AdapterResult<VerificationToken> {
        self.state.lock().unwrap().tokens.push(token.clone());
        Ok(token)
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> AdapterResult<Option<VerificationToken>> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .tokens
            .iter()
            .position(|t| t.identifier == identifier && t.token == token);
        Ok(position.map(|i| state.tokens.remove(i)))
    }
}

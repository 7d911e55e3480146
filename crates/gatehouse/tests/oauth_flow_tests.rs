// End-to-end authorization-code flow scenarios, driven through the
// framework-agnostic handler with a scripted provider and an in-memory
// adapter.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use gatehouse::checks::generate_code_challenge;
use gatehouse::handler::handle_auth_request;
use gatehouse::Storage;

fn id_claims(nonce: Option<&str>) -> serde_json::Value {
    let mut claims = serde_json::json!({
        "iss": "https://id.example.com",
        "aud": "acme-client-id",
        "sub": "acct-42",
        "name": "Jo Doe",
        "email": "jo@example.com",
        "picture": "https://img.example.com/jo.png",
        "exp": chrono::Utc::now().timestamp() + 300,
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = serde_json::json!(nonce);
    }
    claims
}

#[tokio::test]
async fn test_full_oauth_sign_in_flow() {
    let adapter = Arc::new(MemoryAdapter::default());
    let http = Arc::new(StubOAuthHttp::default());
    let ctx = build_context(Storage::Full(adapter.clone()), http.clone());

    let mut browser: HashMap<String, String> = HashMap::new();

    // Step 1: start the flow.
    let response = handle_auth_request(
        ctx.clone(),
        request(
            "GET",
            "/auth/signin/acme?callbackUrl=%2Fdashboard",
            &browser,
            None,
        ),
    )
    .await;
    assert_eq!(response.status, 302);

    let authorize_url = response.location().unwrap().to_string();
    assert!(authorize_url.starts_with("https://id.example.com/authorize?"));
    let params = query_params(&authorize_url);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "acme-client-id");
    assert_eq!(
        params["redirect_uri"],
        "https://app.example.com/auth/callback/acme"
    );
    assert_eq!(params["code_challenge_method"], "S256");
    let state = params["state"].clone();
    let nonce = params["nonce"].clone();
    let challenge = params["code_challenge"].clone();

    // Check cookies were set.
    let names = set_cookie_names(&response);
    assert!(names.iter().any(|n| n == &ctx.cookies.state.name));
    assert!(names.iter().any(|n| n == &ctx.cookies.nonce.name));
    assert!(names.iter().any(|n| n == &ctx.cookies.pkce_code_verifier.name));
    accept_cookies(&mut browser, &response);

    // Step 2: the provider redirects back with a matching state.
    http.set_id_claims(id_claims(Some(&nonce)));
    let response = handle_auth_request(
        ctx.clone(),
        request(
            "GET",
            &format!("/auth/callback/acme?code=auth-code-1&state={state}"),
            &browser,
            None,
        ),
    )
    .await;
    assert_eq!(response.status, 302);
    assert_eq!(
        response.location().unwrap(),
        "https://app.example.com/dashboard"
    );

    // Session cookie set; check cookies expired in the same response.
    let headers = response.headers.get("set-cookie").unwrap();
    assert!(headers
        .iter()
        .any(|h| h.starts_with(&format!("{}=", ctx.cookies.session_token.name))
            && !h.contains("Max-Age=0")));
    assert!(headers
        .iter()
        .any(|h| h.starts_with(&format!("{}=", ctx.cookies.state.name))
            && h.contains("Max-Age=0")));
    accept_cookies(&mut browser, &response);

    // The exchange used the sealed verifier matching the challenge.
    let token_request = http.last_token_request.lock().unwrap().clone().unwrap();
    assert_eq!(token_request.code, "auth-code-1");
    let verifier = token_request.code_verifier.clone().unwrap();
    assert_eq!(generate_code_challenge(&verifier), challenge);

    // Storage holds the user, link, and session record.
    assert_eq!(adapter.user_count(), 1);
    assert_eq!(adapter.account_count(), 1);
    assert_eq!(adapter.session_count(), 1);

    // Step 3: the session resolves.
    let response =
        handle_auth_request(ctx.clone(), request("GET", "/auth/session", &browser, None)).await;
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["user"]["email"], "jo@example.com");
    assert!(body["expires"].as_str().is_some());

    // Step 4: replaying the callback fails; the state cookie is gone.
    let response = handle_auth_request(
        ctx.clone(),
        request(
            "GET",
            &format!("/auth/callback/acme?code=auth-code-1&state={state}"),
            &browser,
            None,
        ),
    )
    .await;
    assert_eq!(response.status, 302);
    assert!(response.location().unwrap().contains("error=OAuthCallback"));
}

#[tokio::test]
async fn test_callback_with_mismatched_state_sets_no_session() {
    let adapter = Arc::new(MemoryAdapter::default());
    let http = Arc::new(StubOAuthHttp::default());
    let ctx = build_context(Storage::Full(adapter.clone()), http.clone());

    let mut browser: HashMap<String, String> = HashMap::new();
    let response =
        handle_auth_request(ctx.clone(), request("GET", "/auth/signin/acme", &browser, None)).await;
    accept_cookies(&mut browser, &response);

    let response = handle_auth_request(
        ctx.clone(),
        request(
            "GET",
            "/auth/callback/acme?code=auth-code-1&state=forged-state",
            &browser,
            None,
        ),
    )
    .await;
    assert_eq!(response.status, 302);
    assert!(response.location().unwrap().contains("error=OAuthCallback"));

    let names = set_cookie_names(&response);
    assert!(!names.iter().any(|n| n == &ctx.cookies.session_token.name));
    assert_eq!(adapter.session_count(), 0);
    assert_eq!(adapter.user_count(), 0);
}

#[tokio::test]
async fn test_second_sign_in_reuses_linked_account() {
    let adapter = Arc::new(MemoryAdapter::default());
    let http = Arc::new(StubOAuthHttp::default());
    let ctx = build_context(Storage::Full(adapter.clone()), http.clone());

    for _ in 0..2 {
        let mut browser: HashMap<String, String> = HashMap::new();
        let response =
            handle_auth_request(ctx.clone(), request("GET", "/auth/signin/acme", &browser, None))
                .await;
        let params = query_params(response.location().unwrap());
        accept_cookies(&mut browser, &response);

        http.set_id_claims(id_claims(Some(&params["nonce"])));
        let response = handle_auth_request(
            ctx.clone(),
            request(
                "GET",
                &format!("/auth/callback/acme?code=c&state={}", params["state"]),
                &browser,
                None,
            ),
        )
        .await;
        assert_eq!(response.status, 302);
        assert!(!response.location().unwrap().contains("error="));
    }

    // One user and one account link despite two sign-ins.
    assert_eq!(adapter.user_count(), 1);
    assert_eq!(adapter.account_count(), 1);
    assert_eq!(adapter.session_count(), 2);
}

#[tokio::test]
async fn test_unlinked_existing_email_is_refused() {
    let adapter = Arc::new(MemoryAdapter::default());
    let http = Arc::new(StubOAuthHttp::default());
    let ctx = build_context(Storage::Full(adapter.clone()), http.clone());

    // A user with this email already exists, with no provider link.
    adapter
        .seed_user(gatehouse::AdapterUser {
            id: String::new(),
            name: Some("Existing".into()),
            email: Some("jo@example.com".into()),
            email_verified: None,
            image: None,
        })
        .await;

    let mut browser: HashMap<String, String> = HashMap::new();
    let response =
        handle_auth_request(ctx.clone(), request("GET", "/auth/signin/acme", &browser, None)).await;
    let params = query_params(response.location().unwrap());
    accept_cookies(&mut browser, &response);

    http.set_id_claims(id_claims(Some(&params["nonce"])));
    let response = handle_auth_request(
        ctx.clone(),
        request(
            "GET",
            &format!("/auth/callback/acme?code=c&state={}", params["state"]),
            &browser,
            None,
        ),
    )
    .await;

    assert_eq!(response.status, 302);
    assert!(response
        .location()
        .unwrap()
        .contains("error=OAuthAccountNotLinked"));
    assert_eq!(adapter.session_count(), 0);
    assert_eq!(adapter.account_count(), 0);
}

#[tokio::test]
async fn test_wrong_nonce_claim_rejected() {
    let adapter = Arc::new(MemoryAdapter::default());
    let http = Arc::new(StubOAuthHttp::default());
    let ctx = build_context(Storage::Full(adapter.clone()), http.clone());

    let mut browser: HashMap<String, String> = HashMap::new();
    let response =
        handle_auth_request(ctx.clone(), request("GET", "/auth/signin/acme", &browser, None)).await;
    let params = query_params(response.location().unwrap());
    accept_cookies(&mut browser, &response);

    // The provider echoes a different nonce than the one we issued.
    http.set_id_claims(id_claims(Some("a-nonce-from-some-other-flow")));
    let response = handle_auth_request(
        ctx.clone(),
        request(
            "GET",
            &format!("/auth/callback/acme?code=c&state={}", params["state"]),
            &browser,
            None,
        ),
    )
    .await;

    assert_eq!(response.status, 302);
    assert!(response.location().unwrap().contains("error=OAuthCallback"));
    assert_eq!(adapter.session_count(), 0);
}

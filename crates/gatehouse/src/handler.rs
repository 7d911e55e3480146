// Framework-agnostic request handling.
//
// Transport adapters convert their native request into `GenericRequest`,
// call `handle_auth_request`, and convert the `GenericResponse` back. The
// router recognizes nine actions and gates state-changing POSTs behind
// the CSRF guard. The cookie jar accumulated during processing is
// appended to the response on every path, including errors, so cleanup
// entries always reach the browser.

use std::collections::HashMap;
use std::sync::Arc;

use gatehouse_core::logger::LogLevel;
use gatehouse_core::ErrorPageParam;

use crate::context::AuthContext;
use crate::cookies::{parse_cookies, CookieJar};
use crate::crypto::csrf;
use crate::routes::{self, RouteOutcome};

// ─── Generic request ────────────────────────────────────────────

/// A framework-agnostic HTTP request.
#[derive(Debug, Clone, Default)]
pub struct GenericRequest {
    /// HTTP method, uppercase.
    pub method: String,
    /// Full request path (e.g. "/auth/signin/acme").
    pub path: String,
    /// Raw query string without the leading "?".
    pub query: Option<String>,
    /// Headers with lowercased names.
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: Option<Vec<u8>>,
}

impl GenericRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Request cookies as a name → value map.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.header("cookie").map(parse_cookies).unwrap_or_default()
    }

    pub fn query_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(ref query) = self.query {
            for pair in query.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    params.insert(
                        urlencoding::decode(key).unwrap_or_default().into_owned(),
                        urlencoding::decode(value).unwrap_or_default().into_owned(),
                    );
                }
            }
        }
        params
    }

    /// Body as a JSON object: parsed directly for JSON payloads, converted
    /// from key/value pairs for url-encoded forms.
    pub fn body_json(&self) -> serde_json::Value {
        let Some(ref body) = self.body else {
            return serde_json::json!({});
        };

        let is_json = self
            .header("content-type")
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        if is_json {
            return serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));
        }

        let text = String::from_utf8_lossy(body);
        let mut map = serde_json::Map::new();
        for pair in text.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                map.insert(
                    urlencoding::decode(key).unwrap_or_default().into_owned(),
                    serde_json::Value::String(
                        urlencoding::decode(value)
                            .unwrap_or_default()
                            .replace('+', " "),
                    ),
                );
            }
        }
        serde_json::Value::Object(map)
    }

    /// A single named field from the body object.
    pub fn body_field(&self, name: &str) -> Option<String> {
        self.body_json()[name].as_str().map(str::to_string)
    }
}

// ─── Generic response ───────────────────────────────────────────

/// A framework-agnostic HTTP response.
#[derive(Debug, Clone)]
pub struct GenericResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl GenericResponse {
    pub fn json(status: u16, data: &serde_json::Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            vec!["application/json".to_string()],
        );
        Self {
            status,
            headers,
            body: serde_json::to_vec(data).unwrap_or_default(),
        }
    }

    pub fn redirect(url: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), vec![url.to_string()]);
        Self {
            status: 302,
            headers,
            body: Vec::new(),
        }
    }

    pub fn not_found() -> Self {
        Self::json(404, &serde_json::json!({ "error": "Not Found" }))
    }

    pub fn method_not_allowed() -> Self {
        Self::json(405, &serde_json::json!({ "error": "Method Not Allowed" }))
    }

    /// Append the jar as Set-Cookie headers.
    fn with_cookies(mut self, jar: &CookieJar) -> Self {
        if !jar.is_empty() {
            self.headers
                .entry("set-cookie".to_string())
                .or_default()
                .extend(jar.headers());
        }
        self
    }

    /// First Location header value, if any.
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get("location")
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}

// ─── Action routing ─────────────────────────────────────────────

/// The nine actions the handler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Providers,
    Session,
    Csrf,
    SignIn,
    SignOut,
    Callback,
    VerifyRequest,
    Error,
    Log,
}

/// Parse a route path (base path already stripped) into an action plus an
/// optional provider segment.
pub fn parse_action(path: &str) -> Option<(Action, Option<String>)> {
    let mut segments = path.trim_matches('/').splitn(2, '/');
    let action = match segments.next()? {
        "providers" => Action::Providers,
        "session" => Action::Session,
        "csrf" => Action::Csrf,
        "signin" => Action::SignIn,
        "signout" => Action::SignOut,
        "callback" => Action::Callback,
        "verify-request" => Action::VerifyRequest,
        "error" => Action::Error,
        "_log" => Action::Log,
        _ => return None,
    };
    let rest = segments.next().filter(|s| !s.is_empty()).map(str::to_string);
    match action {
        Action::SignIn | Action::Callback => Some((action, rest)),
        // No other action takes a sub-segment.
        _ if rest.is_none() => Some((action, None)),
        _ => None,
    }
}

fn strip_base_path(path: &str, base_path: &str) -> String {
    let stripped = path.strip_prefix(base_path).unwrap_or(path);
    if stripped.is_empty() {
        "/".to_string()
    } else if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    }
}

fn outcome_response(outcome: RouteOutcome) -> GenericResponse {
    match outcome {
        RouteOutcome::Redirect(url) => GenericResponse::redirect(&url),
        RouteOutcome::Json(value) => GenericResponse::json(200, &value),
    }
}

// ─── Handler ────────────────────────────────────────────────────

/// Process one auth request.
pub async fn handle_auth_request(
    ctx: Arc<AuthContext>,
    request: GenericRequest,
) -> GenericResponse {
    let route_path = strip_base_path(&request.path, &ctx.base_path);
    let Some((action, provider_id)) = parse_action(&route_path) else {
        return GenericResponse::not_found();
    };

    let request_cookies = request.cookies();
    let mut jar = CookieJar::new();
    let is_post = request.method == "POST";

    // CSRF guard runs on every request so a commitment cookie exists
    // before the first POST. A missing or invalid cookie gets replaced.
    let submitted = request
        .body_field("csrfToken")
        .or_else(|| request.header("x-csrf-token").map(str::to_string));
    let csrf_check = match csrf::issue_or_verify(
        request_cookies.get(&ctx.cookies.csrf_token.name).map(String::as_str),
        &ctx.secrets,
        submitted.as_deref(),
        is_post,
    ) {
        Ok(check) => check,
        Err(e) => {
            ctx.logger.error(&format!("token issuance failed: {e}"));
            return GenericResponse::json(
                500,
                &serde_json::json!({ "error": "Internal Server Error" }),
            )
            .with_cookies(&jar);
        }
    };
    if let Some(ref cookie_value) = csrf_check.cookie_value {
        jar.set_cookie(&ctx.cookies.csrf_token, cookie_value);
    }

    let query = request.query_params();

    let response = match (request.method.as_str(), action) {
        ("GET", Action::Providers) => {
            GenericResponse::json(200, &routes::providers::handle_providers(&ctx))
        }

        ("GET", Action::Csrf) => {
            GenericResponse::json(200, &serde_json::json!({ "csrfToken": csrf_check.token }))
        }

        ("GET", Action::Session) => {
            let body = routes::session::handle_session(&ctx, &request_cookies, &mut jar).await;
            GenericResponse::json(200, &body)
        }

        ("GET" | "POST", Action::SignIn) => match provider_id {
            Some(ref id) => {
                if is_post && !csrf_check.verified {
                    ctx.logger.warn("sign-in POST blocked: request not verified");
                    GenericResponse::redirect(&ctx.error_url(ErrorPageParam::AccessDenied))
                } else {
                    let sign_in_request = routes::sign_in::SignInRequest {
                        callback_url: request
                            .body_field("callbackUrl")
                            .or_else(|| query.get("callbackUrl").cloned()),
                        email: request
                            .body_field("email")
                            .or_else(|| query.get("email").cloned()),
                        authorization_params: query
                            .iter()
                            .filter(|(k, _)| {
                                !matches!(k.as_str(), "callbackUrl" | "email" | "csrfToken")
                            })
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                        body: request.body_json(),
                        csrf_verified: csrf_check.verified,
                    };
                    let outcome = routes::sign_in::handle_sign_in(
                        &ctx,
                        id,
                        sign_in_request,
                        &request_cookies,
                        &mut jar,
                    )
                    .await;
                    outcome_response(outcome)
                }
            }
            None => match ctx.options.pages.sign_in {
                Some(ref page) => GenericResponse::redirect(page),
                None => GenericResponse::json(200, &routes::providers::handle_providers(&ctx)),
            },
        },

        ("POST", Action::SignOut) => {
            if !csrf_check.verified {
                ctx.logger.warn("sign-out POST blocked: request not verified");
                GenericResponse::redirect(&ctx.error_url(ErrorPageParam::AccessDenied))
            } else {
                let callback_url = request
                    .body_field("callbackUrl")
                    .or_else(|| query.get("callbackUrl").cloned());
                let outcome = routes::sign_out::handle_sign_out(
                    &ctx,
                    callback_url.as_deref(),
                    &request_cookies,
                    &mut jar,
                )
                .await;
                outcome_response(outcome)
            }
        }

        ("GET" | "POST", Action::Callback) => match provider_id {
            Some(ref id) => {
                // Form-post callbacks carry their parameters in the body.
                let mut merged_query = query.clone();
                if is_post {
                    if let serde_json::Value::Object(fields) = request.body_json() {
                        for (key, value) in fields {
                            if let Some(s) = value.as_str() {
                                merged_query.entry(key).or_insert_with(|| s.to_string());
                            }
                        }
                    }
                }
                let outcome = routes::callback::handle_callback(
                    &ctx,
                    id,
                    routes::callback::CallbackRequest {
                        query: merged_query,
                        body: request.body_json(),
                        csrf_verified: csrf_check.verified,
                    },
                    &request_cookies,
                    &mut jar,
                )
                .await;
                outcome_response(outcome)
            }
            None => GenericResponse::not_found(),
        },

        ("GET", Action::VerifyRequest) => GenericResponse::json(
            200,
            &serde_json::json!({ "message": "A sign-in link has been sent to your email address." }),
        ),

        ("GET", Action::Error) => {
            let error = query
                .get("error")
                .map(|e| ErrorPageParam::parse(e))
                .unwrap_or(ErrorPageParam::Configuration);
            GenericResponse::json(200, &serde_json::json!({ "error": error.as_str() }))
        }

        ("POST", Action::Log) => {
            let body = request.body_json();
            let level = LogLevel::from(body["level"].as_str().unwrap_or("error"));
            let code = body["code"].as_str().unwrap_or("unknown");
            let message = body["message"].as_str().unwrap_or("");
            ctx.logger.log(level, &format!("client report [{code}]: {message}"));
            GenericResponse::json(200, &serde_json::json!({}))
        }

        _ => GenericResponse::method_not_allowed(),
    };

    response.with_cookies(&jar)
}

// Authorization URL assembly.
//
// Parameters come from three layers, later wins: protocol defaults,
// static provider config, per-request overrides.

use gatehouse_core::error::{AuthError, Result};

/// Inputs for building the authorization redirect.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationUrlParams {
    pub endpoint: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Defaults to "code".
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// S256 PKCE challenge derived from the sealed verifier.
    pub code_challenge: Option<String>,
    /// Static provider params followed by request overrides.
    pub extra_params: Vec<(String, String)>,
}

/// Build the provider authorization URL.
pub fn build_authorization_url(params: AuthorizationUrlParams) -> Result<url::Url> {
    let mut url = url::Url::parse(&params.endpoint)
        .map_err(|e| AuthError::Config(format!("invalid authorization endpoint: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair(
            "response_type",
            params.response_type.as_deref().unwrap_or("code"),
        );
        query.append_pair("client_id", &params.client_id);
        query.append_pair("redirect_uri", &params.redirect_uri);

        if let Some(ref scope) = params.scope {
            query.append_pair("scope", scope);
        }
        if let Some(ref state) = params.state {
            query.append_pair("state", state);
        }
        if let Some(ref nonce) = params.nonce {
            query.append_pair("nonce", nonce);
        }
        if let Some(ref challenge) = params.code_challenge {
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("code_challenge", challenge);
        }
        for (key, value) in &params.extra_params {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}

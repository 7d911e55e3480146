// Token endpoint response handling.

use serde::{Deserialize, Serialize};

/// The token set returned by an authorization-code exchange.
///
/// `expires_at` is absolute (seconds since the epoch): providers that only
/// return a relative `expires_in` get it converted at parse time, so the
/// stored account record never depends on when it is read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
    /// The full response body for provider-specific extras.
    pub raw: serde_json::Value,
}

impl TokenSet {
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let expires_at = raw["expires_at"].as_i64().or_else(|| {
            raw["expires_in"]
                .as_i64()
                .map(|ttl| chrono::Utc::now().timestamp() + ttl)
        });

        Self {
            access_token: raw["access_token"].as_str().map(str::to_string),
            token_type: raw["token_type"].as_str().map(str::to_string),
            expires_at,
            refresh_token: raw["refresh_token"].as_str().map(str::to_string),
            id_token: raw["id_token"].as_str().map(str::to_string),
            scope: raw["scope"].as_str().map(str::to_string),
            raw,
        }
    }
}

// CSRF guard: double-submit cookie with a secret-bound commitment.
//
// The cookie stores `token|hash` where `hash = SHA-256(token ‖ secret)`.
// The hash binds the cookie to the server secret, so an attacker who can
// plant cookies but cannot read the secret cannot forge a valid pair. No
// server-side token storage is involved.

use sha2::{Digest, Sha256};

use gatehouse_core::error::Result;

use crate::crypto::{constant_time_equal, random_bytes};

/// Entropy of a freshly minted token, in bytes.
const TOKEN_ENTROPY_BYTES: usize = 32;

/// Outcome of the CSRF guard for one request.
#[derive(Debug, Clone)]
pub struct CsrfCheck {
    /// The token the client must echo on state-changing requests.
    pub token: String,
    /// `token|hash` cookie value to set; None when the incoming cookie was
    /// already valid.
    pub cookie_value: Option<String>,
    /// True only for a POST whose submitted token matches the cookie-bound
    /// commitment.
    pub verified: bool,
}

fn hash_token(token: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate an incoming CSRF cookie or mint a fresh commitment.
///
/// A request counts as verified only when (a) the cookie hash matches a
/// fresh recomputation with the current (newest) secret and (b) it is a
/// POST whose submitted token equals the cookie token. A new cookie is
/// emitted whenever the incoming one is absent or invalid, including on
/// GET, so a token is always available before the first POST.
pub fn issue_or_verify(
    cookie_value: Option<&str>,
    secrets: &[String],
    submitted: Option<&str>,
    is_post: bool,
) -> Result<CsrfCheck> {
    let secret = secrets.first().map(String::as_str).unwrap_or_default();

    if let Some(raw) = cookie_value {
        if let Some((token, hash)) = raw.split_once('|') {
            let expected = hash_token(token, secret);
            if constant_time_equal(expected.as_bytes(), hash.as_bytes()) {
                let verified = is_post
                    && submitted
                        .map(|s| constant_time_equal(s.as_bytes(), token.as_bytes()))
                        .unwrap_or(false);
                return Ok(CsrfCheck {
                    token: token.to_string(),
                    cookie_value: None,
                    verified,
                });
            }
        }
    }

    let token = hex::encode(random_bytes(TOKEN_ENTROPY_BYTES));
    let hash = hash_token(&token, secret);
    Ok(CsrfCheck {
        cookie_value: Some(format!("{token}|{hash}")),
        token,
        verified: false,
    })
}
